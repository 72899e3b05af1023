use std::fmt::Display;

use camino::Utf8PathBuf;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag},
    character::complete::{alpha1, alphanumeric1, char},
    combinator::{all_consuming, map, recognize, value},
    multi::{many0, many1},
    sequence::{delimited, pair},
    IResult,
};

use crate::{Error, Result, TagBindings};

/// The placeholder that expands to each principal in turn
pub const USER_PLACEHOLDER: &str = "user";

/// Part of a [`Template`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text (with `{{` and `}}` already unescaped)
    Text(String),
    /// The name inside a `{name}` placeholder
    Placeholder(String),
}

/// A path with `{user}` and `{<tag>}` placeholders, such as `"{home}/{user}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Parses a template, rejecting empty templates and unbalanced braces
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidTemplate {
            template: source.to_owned(),
            reason,
        };
        if source.is_empty() {
            return Err(invalid("template is empty".into()));
        }
        let (_, tokens) = template(source).map_err(|err| match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                invalid(format!("unexpected input at \"{}\"", e.input))
            }
            incomplete @ nom::Err::Incomplete(_) => invalid(incomplete.to_string()),
        })?;
        Ok(Template {
            source: source.to_owned(),
            tokens: merge_text(tokens),
        })
    }

    /// The template as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed parts of the template
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Names of all placeholders, in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Placeholder(name) => Some(name.as_str()),
            Token::Text(_) => None,
        })
    }

    /// Returns true if the template expands once per principal
    pub fn has_user(&self) -> bool {
        self.placeholders().any(|name| name == USER_PLACEHOLDER)
    }

    /// Substitutes `{user}` with the principal and every other placeholder with its tag's path
    pub fn render(&self, principal: &str, tags: &TagBindings) -> Result<Utf8PathBuf> {
        let mut rendered = String::new();
        for token in &self.tokens {
            match token {
                Token::Text(text) => rendered.push_str(text),
                Token::Placeholder(name) if name == USER_PLACEHOLDER => {
                    rendered.push_str(principal)
                }
                Token::Placeholder(name) => match tags.get(name) {
                    Some(path) => rendered.push_str(path.as_str()),
                    None => {
                        return Err(Error::PathResolution {
                            placeholder: name.clone(),
                            template: self.source.clone(),
                        })
                    }
                },
            }
        }
        Ok(rendered.into())
    }
}

impl Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn merge_text(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match (merged.last_mut(), token) {
            (Some(Token::Text(previous)), Token::Text(text)) => previous.push_str(&text),
            (_, token) => merged.push(token),
        }
    }
    merged
}

/// Template, such as "{home}/{{literal}}/{user}"
///
fn template(s: &str) -> IResult<&str, Vec<Token>> {
    all_consuming(many1(alt((text, escaped_brace, placeholder))))(s)
}

fn text(s: &str) -> IResult<&str, Token> {
    map(is_not("{}"), |text: &str| Token::Text(text.to_owned()))(s)
}

fn escaped_brace(s: &str) -> IResult<&str, Token> {
    alt((
        value(Token::Text("{".into()), tag("{{")),
        value(Token::Text("}".into()), tag("}}")),
    ))(s)
}

/// A name between braces, such as `{user}`
///
fn placeholder(s: &str) -> IResult<&str, Token> {
    map(delimited(char('{'), identifier, char('}')), |name: &str| {
        Token::Placeholder(name.to_owned())
    })(s)
}

fn identifier(s: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag("-")))),
    ))(s)
}
