use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::TwitchError;

/// A single IRC line with IRCv3 tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: BTreeMap<String, String>,
    /// `nick!user@host` or a server name, without the leading colon.
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            command: command.into(),
            params,
            ..Self::default()
        }
    }

    /// Parse one line, with or without the trailing CRLF.
    pub fn parse(line: &str) -> Result<Self, TwitchError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        if rest.trim().is_empty() {
            return Err(TwitchError::Irc("empty line".into()));
        }

        let mut msg = Self::default();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped
                .split_once(' ')
                .ok_or_else(|| TwitchError::Irc(format!("missing command: {line}")))?;
            msg.tags = parse_tags(raw_tags);
            rest = after.trim_start_matches(' ');
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = stripped
                .split_once(' ')
                .ok_or_else(|| TwitchError::Irc(format!("missing command: {line}")))?;
            msg.prefix = Some(prefix.to_string());
            rest = after.trim_start_matches(' ');
        }

        let (command, mut params) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(TwitchError::Irc(format!("missing command: {line}")));
        }
        msg.command = command.to_ascii_uppercase();

        loop {
            params = params.trim_start_matches(' ');
            if params.is_empty() {
                break;
            }
            if let Some(trailing) = params.strip_prefix(':') {
                msg.params.push(trailing.to_string());
                break;
            }
            match params.split_once(' ') {
                Some((param, after)) => {
                    msg.params.push(param.to_string());
                    params = after;
                }
                None => {
                    msg.params.push(params.to_string());
                    break;
                }
            }
        }

        Ok(msg)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Nickname part of the prefix, if the prefix names a user.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let (nick, _) = prefix.split_once('!')?;
        Some(nick)
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Last parameter (usually the `:trailing` text).
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

impl FromStr for IrcMessage {
    type Err = TwitchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            let tags = self
                .tags
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{k}={}", escape_tag_value(v))
                    }
                })
                .collect::<Vec<_>>()
                .join(";");
            write!(f, "@{tags} ")?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

fn parse_tags(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), unescape_tag_value(v)),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            // A lone trailing backslash is dropped.
            None => {}
        }
    }
    out
}

fn escape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}
