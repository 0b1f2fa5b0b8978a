use chrono::NaiveDate;

use crate::filter::model::{
    DateRange, FilterGroup, FilterNode, FilterRule, FilterValue, GroupOperator, Operator,
    PropertyCategory,
};

pub struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at position {pos}: {message}")]
pub struct ParseError {
    pub message: String,
    pub pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    pub fn parse(mut self) -> Result<FilterNode, ParseError> {
        let expr = self.parse_or()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error("Unexpected input after expression"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<FilterNode, ParseError> {
        let mut terms = vec![self.parse_and()?];
        loop {
            self.skip_whitespace();
            if !self.match_keyword("OR") {
                break;
            }
            terms.push(self.parse_and()?);
        }
        Ok(group_of(GroupOperator::Or, terms))
    }

    fn parse_and(&mut self) -> Result<FilterNode, ParseError> {
        let mut terms = vec![self.parse_unary()?];
        loop {
            self.skip_whitespace();
            if !self.match_keyword("AND") {
                break;
            }
            terms.push(self.parse_unary()?);
        }
        Ok(group_of(GroupOperator::And, terms))
    }

    fn parse_unary(&mut self) -> Result<FilterNode, ParseError> {
        self.skip_whitespace();
        if self.match_keyword("NOT") {
            let inner = self.parse_unary()?;
            return Ok(negate(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterNode, ParseError> {
        self.skip_whitespace();

        if self.match_char('(') {
            let expr = self.parse_or()?;
            self.skip_whitespace();
            if !self.match_char(')') {
                return Err(self.error("Expected ')'"));
            }
            return Ok(expr);
        }

        let property = self.parse_property()?;
        self.skip_whitespace();
        if !self.match_char(':') {
            return Err(self.error("Expected ':' followed by a property type"));
        }
        let category = self.parse_category()?;
        let operator = self.parse_operator()?;
        if !category.supports(operator) {
            return Err(self.error(&format!(
                "Operator {operator} is not available for {category:?}"
            )));
        }

        let value = if operator.takes_value() {
            self.parse_value()?
        } else {
            FilterValue::Null
        };

        Ok(FilterNode::Rule(FilterRule::new(property, category, operator, value)))
    }

    fn parse_property(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        if self.match_char('"') {
            return self.parse_quoted();
        }
        self.parse_identifier()
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        while self.pos < self.input.len() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }

        if self.pos == start {
            return Err(self.error("Expected identifier"));
        }

        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_category(&mut self) -> Result<PropertyCategory, ParseError> {
        let start = self.pos;
        let word = self.parse_identifier()?;
        PropertyCategory::parse(&word).ok_or_else(|| ParseError {
            message: format!("Unknown property type '{word}'"),
            pos: start,
        })
    }

    fn parse_operator(&mut self) -> Result<Operator, ParseError> {
        self.skip_whitespace();

        if self.match_str(">=") {
            return Ok(Operator::GreaterThanOrEqualTo);
        }
        if self.match_str("<=") {
            return Ok(Operator::LessThanOrEqualTo);
        }
        if self.match_str("!=") {
            return Ok(Operator::DoesNotEqual);
        }
        if self.match_char('=') {
            return Ok(Operator::Equals);
        }
        if self.match_char('>') {
            return Ok(Operator::GreaterThan);
        }
        if self.match_char('<') {
            return Ok(Operator::LessThan);
        }

        let start = self.pos;
        if let Ok(word) = self.parse_identifier() {
            if let Some(op) = Operator::from_name(&word.to_ascii_lowercase()) {
                return Ok(op);
            }
        }
        self.pos = start;
        Err(self.error("Expected operator (=, !=, >, <, >=, <=, or an operator name)"))
    }

    fn parse_value(&mut self) -> Result<FilterValue, ParseError> {
        self.skip_whitespace();

        if self.match_char('"') {
            return self.parse_quoted().map(FilterValue::String);
        }

        if self.match_keyword("true") {
            return Ok(FilterValue::Bool(true));
        }
        if self.match_keyword("false") {
            return Ok(FilterValue::Bool(false));
        }

        self.parse_number_or_date()
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while self.pos < self.input.len() && self.current_char() != '"' {
            self.pos += self.current_char().len_utf8();
        }
        let s = self.input[start..self.pos].to_string();
        if !self.match_char('"') {
            return Err(self.error("Unterminated string"));
        }
        Ok(s)
    }

    fn parse_number_or_date(&mut self) -> Result<FilterValue, ParseError> {
        let start = self.pos;

        let negative = self.match_char('-');

        while self.pos < self.input.len() {
            let c = self.current_char();
            if c.is_ascii_digit() || c == '.' || c == '-' {
                self.pos += 1;
            } else {
                break;
            }
        }

        if self.pos == start || (negative && self.pos == start + 1) {
            return Err(self.error("Expected value"));
        }

        let text = &self.input[start..self.pos];

        if let Some(range) = try_parse_date_range(text) {
            return Ok(FilterValue::DateRange(range));
        }

        text.parse::<f64>()
            .map(FilterValue::Number)
            .map_err(|_| self.error("Invalid number or date"))
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.current_char().is_whitespace() {
            self.pos += self.current_char().len_utf8();
        }
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn match_char(&mut self, c: char) -> bool {
        if self.pos < self.input.len() && self.current_char() == c {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn match_str(&mut self, s: &str) -> bool {
        if self.input[self.pos..].starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn match_keyword(&mut self, kw: &str) -> bool {
        let remaining = &self.input[self.pos..];
        let Some(head) = remaining.get(..kw.len()) else {
            return false;
        };
        if !head.eq_ignore_ascii_case(kw) {
            return false;
        }
        let after = remaining[kw.len()..].chars().next();
        if after.map_or(true, |c| !c.is_alphanumeric() && c != '_') {
            self.pos += kw.len();
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            pos: self.pos,
        }
    }
}

fn group_of(operator: GroupOperator, mut terms: Vec<FilterNode>) -> FilterNode {
    if terms.len() == 1 {
        return terms.remove(0);
    }
    FilterNode::Group(FilterGroup::new(operator, terms))
}

/// A lone rule cannot carry a negation, so it gets a one-child group.
fn negate(node: FilterNode) -> FilterNode {
    match node {
        FilterNode::Group(group) => FilterNode::Group(FilterGroup {
            negated: !group.negated,
            ..group
        }),
        rule @ FilterNode::Rule(_) => FilterNode::Group(FilterGroup {
            operator: GroupOperator::And,
            negated: true,
            children: vec![rule],
        }),
    }
}

fn try_parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn try_parse_date_range(s: &str) -> Option<DateRange> {
    match s.split_once("..") {
        Some((start, end)) => Some(DateRange {
            start: try_parse_date(start)?,
            end: Some(try_parse_date(end)?),
        }),
        None => Some(DateRange {
            start: try_parse_date(s)?,
            end: None,
        }),
    }
}

pub fn parse(input: &str) -> Result<FilterNode, ParseError> {
    Parser::new(input).parse()
}
