//! Header cards: parsing of 80-column records into typed keyword values.
//!
//! A header is read card by card until the `END` card and always spans a
//! whole number of 2880-byte blocks. Supported conventions:
//!
//! - quoted strings with `''` escapes (trailing blanks are insignificant)
//! - `D` exponents in reals (`1.5D+03`)
//! - `HIERARCH` keywords longer than eight characters
//! - `CONTINUE` cards extending a string ending in `&`
//! - commentary cards (`COMMENT`, `HISTORY`, blank keyword)

use super::{slice_at, FormatError, Result, BLOCK_SIZE, CARD_SIZE};
use serde::Serialize;
use std::fmt;

/// Typed value of a header card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.fract() == 0.0 && r.abs() < 9.0e15 => Some(*r as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Logical(true) => write!(f, "T"),
            Value::Logical(false) => write!(f, "F"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => f.write_str(&format_real(*r)),
            Value::Text(s) => {
                let escaped = s.replace('\'', "''");
                write!(f, "'{escaped:<8}'")
            }
        }
    }
}

/// Reals always carry a decimal point or exponent so they re-parse as reals.
fn format_real(r: f64) -> String {
    if !r.is_finite() {
        return format!("{r}");
    }
    let magnitude = r.abs();
    if magnitude == 0.0 || (1.0e-4..1.0e15).contains(&magnitude) {
        let s = format!("{r}");
        if s.contains('.') {
            s
        } else {
            format!("{s}.0")
        }
    } else {
        format!("{r:E}")
    }
}

/// One keyword record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub keyword: String,
    /// `None` for commentary cards and for keywords with an undefined value.
    pub value: Option<Value>,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: impl Into<String>, value: Value) -> Self {
        Self {
            keyword: keyword.into(),
            value: Some(value),
            comment: None,
        }
    }

    pub fn commentary(keyword: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            value: None,
            comment: Some(text.into()),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn is_commentary(&self) -> bool {
        matches!(self.keyword.as_str(), "COMMENT" | "HISTORY" | "")
    }
}

impl fmt::Display for Card {
    /// Renders the card as it would appear in an 80-column record,
    /// truncated at 80 characters.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = if self.is_commentary() {
            format!("{:<8}{}", self.keyword, self.comment.as_deref().unwrap_or(""))
        } else {
            let key = if self.keyword.len() > 8 {
                format!("HIERARCH {} ", self.keyword)
            } else {
                format!("{:<8}", self.keyword)
            };
            let value = match &self.value {
                Some(v @ Value::Text(_)) => format!("{:<20}", v.to_string()),
                Some(v) => format!("{:>20}", v.to_string()),
                None => " ".repeat(20),
            };
            match &self.comment {
                Some(c) => format!("{key}= {value} / {c}"),
                None => format!("{key}= {value}"),
            }
        };
        line.truncate(CARD_SIZE);
        f.write_str(line.trim_end())
    }
}

/// Ordered sequence of cards for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    /// Parse the header beginning at `offset`.
    ///
    /// Returns the header and the number of bytes it occupies, rounded up
    /// to whole blocks.
    pub fn parse(data: &[u8], offset: usize) -> Result<(Header, usize)> {
        let mut cards: Vec<Card> = Vec::new();
        let mut pos = offset;

        loop {
            let Ok(raw) = slice_at(data, pos, CARD_SIZE, "header") else {
                return Err(FormatError::MissingEnd(offset));
            };
            if !raw.iter().all(|b| (0x20..=0x7e).contains(b)) {
                return Err(FormatError::NonAscii(pos));
            }
            let text = String::from_utf8_lossy(raw);
            pos += CARD_SIZE;

            if text.trim_end() == "END" {
                break;
            }
            if text.trim().is_empty() {
                continue;
            }

            let card = parse_card(&text);
            if card.keyword == "CONTINUE" {
                if let Some(previous) = cards.last_mut() {
                    if append_continuation(previous, &card) {
                        continue;
                    }
                }
            }
            cards.push(card);
        }

        let consumed = (pos - offset).div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        Ok((Header { cards }, consumed))
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// First card with the given keyword (case-insensitive).
    pub fn card(&self, keyword: &str) -> Option<&Card> {
        self.cards
            .iter()
            .find(|c| c.keyword.eq_ignore_ascii_case(keyword))
    }

    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.card(keyword).and_then(|c| c.value.as_ref())
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.card(keyword).is_some()
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(Value::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(Value::as_str)
    }

    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        self.get(keyword).and_then(Value::as_bool)
    }

    /// Integer keyword that must be present.
    pub fn require_i64(&self, keyword: &str) -> Result<i64> {
        match self.get(keyword) {
            None => Err(FormatError::MissingKeyword(keyword.to_string())),
            Some(v) => v.as_i64().ok_or_else(|| FormatError::invalid(keyword, v)),
        }
    }

    /// Replace the value of the first card with this keyword, or append one.
    pub fn set(&mut self, keyword: &str, value: Value) {
        match self
            .cards
            .iter_mut()
            .find(|c| c.keyword.eq_ignore_ascii_case(keyword))
        {
            Some(card) => card.value = Some(value),
            None => self.cards.push(Card::new(keyword.to_ascii_uppercase(), value)),
        }
    }

    /// Remove every card with this keyword.
    pub fn remove(&mut self, keyword: &str) {
        self.cards.retain(|c| !c.keyword.eq_ignore_ascii_case(keyword));
    }

    /// Rename a keyword in place, keeping its position. Returns false when
    /// the keyword is absent.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self
            .cards
            .iter_mut()
            .find(|c| c.keyword.eq_ignore_ascii_case(from))
        {
            Some(card) => {
                card.keyword = to.to_string();
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for card in &self.cards {
            writeln!(f, "{card}")?;
        }
        write!(f, "END")
    }
}

// ---------------------------------------------------------------------------
// Card parsing
// ---------------------------------------------------------------------------

fn parse_card(text: &str) -> Card {
    let (keyword, rest) = split_keyword(text);

    match rest {
        Some(field) => {
            let (value, comment) = parse_value_field(field);
            Card {
                keyword,
                value,
                comment,
            }
        }
        None => {
            let body = text.get(8..).unwrap_or("").trim_end();
            if keyword == "CONTINUE" {
                let (value, comment) = parse_value_field(body);
                return Card {
                    keyword,
                    value,
                    comment,
                };
            }
            Card {
                keyword,
                value: None,
                comment: (!body.is_empty()).then(|| body.trim_start().to_string()),
            }
        }
    }
}

/// Split a card into its keyword and, when a value indicator is present,
/// the value field that follows it.
fn split_keyword(text: &str) -> (String, Option<&str>) {
    if let Some(rest) = text.strip_prefix("HIERARCH ") {
        if let Some(eq) = rest.find('=') {
            return (rest[..eq].trim().to_string(), Some(&rest[eq + 1..]));
        }
    }

    let keyword = text.get(..8).unwrap_or(text).trim_end().to_string();
    let has_value = text.get(8..10) == Some("= ");
    let is_commentary = matches!(keyword.as_str(), "COMMENT" | "HISTORY" | "");
    if has_value && !is_commentary {
        (keyword, text.get(10..))
    } else {
        (keyword, None)
    }
}

fn parse_value_field(field: &str) -> (Option<Value>, Option<String>) {
    let field = field.trim_start();

    if let Some(body) = field.strip_prefix('\'') {
        let (text, remainder) = read_quoted(body);
        return (Some(Value::Text(text)), trailing_comment(remainder));
    }

    let (token, comment) = match field.find('/') {
        Some(slash) => (&field[..slash], trailing_comment(&field[slash..])),
        None => (field, None),
    };
    (parse_scalar(token.trim()), comment)
}

/// Read a quoted string body (after the opening quote). Returns the
/// unescaped text and whatever follows the closing quote.
fn read_quoted(body: &str) -> (String, &str) {
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if let Some(&(_, '\'')) = chars.peek() {
                out.push('\'');
                chars.next();
                continue;
            }
            return (out.trim_end().to_string(), &body[i + 1..]);
        }
        out.push(c);
    }
    // Unterminated string: keep what there is.
    (out.trim_end().to_string(), "")
}

fn trailing_comment(remainder: &str) -> Option<String> {
    let remainder = remainder.trim();
    let comment = remainder.strip_prefix('/')?.trim();
    (!comment.is_empty()).then(|| comment.to_string())
}

fn parse_scalar(token: &str) -> Option<Value> {
    match token {
        "" => None,
        "T" => Some(Value::Logical(true)),
        "F" => Some(Value::Logical(false)),
        _ => {
            if let Ok(i) = token.parse::<i64>() {
                return Some(Value::Integer(i));
            }
            let normalized = token.replace(['D', 'd'], "E");
            match normalized.parse::<f64>() {
                Ok(r) => Some(Value::Real(r)),
                // Complex values and anything unrecognized stay verbatim.
                Err(_) => Some(Value::Text(token.to_string())),
            }
        }
    }
}

/// Merge a `CONTINUE` card into a preceding long string.
fn append_continuation(previous: &mut Card, continuation: &Card) -> bool {
    let (Some(Value::Text(head)), Some(Value::Text(tail))) =
        (previous.value.as_mut(), continuation.value.as_ref())
    else {
        return false;
    };
    let Some(stripped) = head.strip_suffix('&') else {
        return false;
    };
    *head = format!("{stripped}{tail}");
    if let Some(c) = &continuation.comment {
        previous.comment = Some(match previous.comment.take() {
            Some(prev) => format!("{prev} {c}"),
            None => c.clone(),
        });
    }
    true
}
