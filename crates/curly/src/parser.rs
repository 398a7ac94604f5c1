use crate::ast::{EscapeKey, Ident, Literal, Node, NodeKind};
use crate::diagnostics::Position;
use crate::error::SyntaxError;

#[cfg(test)]
mod tests;

/// Parse template source into a position-annotated block node.
///
/// The parser is a backtracking recursive descent over the tag grammar.
/// Alternatives that fail reset the cursor and record what they expected at
/// the furthest position reached, so a total failure reports the single
/// deepest location with the union of everything that could have matched
/// there.
pub fn parse(source: &str) -> Result<Node, SyntaxError> {
    let mut parser = Parser::new(source);
    let block = parser.block();
    if parser.at_end() {
        return Ok(block);
    }
    parser.fail("end of input");
    Err(parser.into_error())
}

#[derive(Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    column: usize,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    max_fail_pos: usize,
    expected: Vec<&'static str>,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            max_fail_pos: 0,
            expected: Vec::new(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
        self.column = mark.column;
    }

    fn advance(&mut self) {
        let ch = self.chars[self.pos];
        match ch {
            '\n' => {
                // `\r\n` counts as one line boundary.
                if self.pos == 0 || self.chars[self.pos - 1] != '\r' {
                    self.line += 1;
                }
                self.column = 1;
            }
            '\r' | '\u{2028}' | '\u{2029}' => {
                self.line += 1;
                self.column = 1;
            }
            _ => self.column += 1,
        }
        self.pos += 1;
    }

    /// Record an expectation at the current position. Only the furthest
    /// position's expectations survive.
    fn fail(&mut self, expected: &'static str) {
        if self.pos < self.max_fail_pos {
            return;
        }
        if self.pos > self.max_fail_pos {
            self.max_fail_pos = self.pos;
            self.expected.clear();
        }
        self.expected.push(expected);
    }

    fn into_error(self) -> SyntaxError {
        let found = self.chars.get(self.max_fail_pos).map(|c| c.to_string());
        let position = position_at(&self.chars, self.max_fail_pos);
        let expected = self.expected.iter().map(|s| s.to_string()).collect();
        SyntaxError::new(expected, found, position)
    }

    fn eat_char(&mut self, wanted: char, expected: &'static str) -> bool {
        if self.peek() == Some(wanted) {
            self.advance();
            true
        } else {
            self.fail(expected);
            false
        }
    }

    fn eat_str(&mut self, wanted: &str, expected: &'static str) -> bool {
        let mut offset = 0;
        for ch in wanted.chars() {
            if self.chars.get(self.pos + offset) != Some(&ch) {
                self.fail(expected);
                return false;
            }
            offset += 1;
        }
        for _ in 0..offset {
            self.advance();
        }
        true
    }

    /// Consume everything up to (not including) the first occurrence of the
    /// two-character terminator. Returns the consumed text, or resets when
    /// the terminator never appears.
    fn take_until(&mut self, a: char, b: char, expected: &'static str) -> Option<String> {
        let start = self.mark();
        let mut text = String::new();
        while self.pos + 1 < self.chars.len() {
            if self.chars[self.pos] == a && self.chars[self.pos + 1] == b {
                return Some(text);
            }
            text.push(self.chars[self.pos]);
            self.advance();
        }
        // Report the miss at the end of input, where the scan gave up.
        while !self.at_end() {
            self.advance();
        }
        self.fail(expected);
        self.reset(start);
        None
    }

    // ---- grammar rules -------------------------------------------------

    fn block(&mut self) -> Node {
        let position = self.position();
        let mut nodes = Vec::new();
        loop {
            while self.comment() {}
            if let Some(tag) = self.tag() {
                nodes.push(tag);
                continue;
            }
            if let Some(text) = self.buffer_run() {
                nodes.push(text);
                continue;
            }
            break;
        }
        Node::new(NodeKind::Block(nodes), position)
    }

    fn eol(&mut self) -> bool {
        for pat in ["\n", "\r\n", "\r", "\u{2028}", "\u{2029}"] {
            if self.eat_str(pat, "line break") {
                return true;
            }
        }
        false
    }

    fn is_eol_char(ch: char) -> bool {
        matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
    }

    fn ws(&mut self) -> Option<char> {
        match self.peek() {
            Some(ch) if matches!(ch, '\t' | '\u{b}' | '\u{c}' | ' ' | '\u{a0}' | '\u{feff}') => {
                self.advance();
                Some(ch)
            }
            Some(ch) if Self::is_eol_char(ch) => {
                let before = self.mark();
                if self.eol() {
                    // Whitespace runs normalize every boundary form to `\n`.
                    Some('\n')
                } else {
                    self.reset(before);
                    self.fail("whitespace");
                    None
                }
            }
            _ => {
                self.fail("whitespace");
                None
            }
        }
    }

    fn filler(&mut self) {
        loop {
            if self.ws().is_some() {
                continue;
            }
            if self.comment() {
                continue;
            }
            break;
        }
    }

    fn comment(&mut self) -> bool {
        let start = self.mark();
        if !self.eat_str("{*", "\"{*\"") {
            self.reset(start);
            return false;
        }
        match self.take_until('*', '}', "\"*}\"") {
            Some(_) => {
                // Consume the terminator; comment text is discarded.
                self.advance();
                self.advance();
                true
            }
            None => {
                self.reset(start);
                false
            }
        }
    }

    fn buffer_run(&mut self) -> Option<Node> {
        let position = self.position();
        if self.eol() {
            let mut text = String::from("\n");
            while let Some(ch) = self.ws() {
                text.push(ch);
            }
            return Some(Node::new(NodeKind::Format(text), position));
        }

        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch == '{' || ch == '}' || Self::is_eol_char(ch) {
                break;
            }
            text.push(ch);
            self.advance();
        }
        if text.is_empty() {
            None
        } else {
            Some(Node::new(NodeKind::Buffer(text), position))
        }
    }

    /// All tag forms share the opening brace, so order matters.
    fn tag(&mut self) -> Option<Node> {
        if let Some(node) = self.fn_create() {
            return Some(node);
        }
        if let Some(node) = self.pipe() {
            return Some(node);
        }
        if let Some(node) = self.call() {
            return Some(node);
        }
        if let Some(node) = self.raw() {
            return Some(node);
        }
        if let Some(node) = self.escape_tag() {
            return Some(node);
        }
        self.empty_tag()
    }

    fn fn_create(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if !self.eat_char('{', "\"{\"") {
            return None;
        }
        self.filler();
        if !self.eat_str("fn", "\"fn\"") {
            self.reset(start);
            return None;
        }
        self.filler();
        let before_params = self.mark();
        let params = match self.paramlist() {
            Some(list) => {
                self.filler();
                Some(list)
            }
            None => {
                self.reset(before_params);
                None
            }
        };
        let body = self.block();
        self.filler();
        if !self.eat_char('}', "\"}\"") {
            self.reset(start);
            return None;
        }
        Some(Node::new(
            NodeKind::Fn {
                params,
                body: Box::new(body),
            },
            position,
        ))
    }

    fn paramlist(&mut self) -> Option<Vec<String>> {
        let start = self.mark();
        if !self.eat_char('(', "\"(\"") {
            return None;
        }
        self.filler();
        let mut keys = Vec::new();
        while let Some(key) = self.key() {
            keys.push(key);
            self.filler();
        }
        self.filler();
        if !self.eat_char(')', "\")\"") {
            self.reset(start);
            return None;
        }
        Some(keys)
    }

    fn pipe(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if !self.eat_char('{', "\"{\"") {
            return None;
        }
        self.filler();
        let Some(head) = self.pipe_start() else {
            self.reset(start);
            return None;
        };
        self.filler();
        let mut stages = Vec::new();
        loop {
            let before = self.mark();
            if !self.eat_char('|', "\"|\"") {
                break;
            }
            match self.pipe_continue() {
                Some(stage) => stages.push(stage),
                None => {
                    self.reset(before);
                    break;
                }
            }
        }
        if stages.is_empty() {
            self.reset(start);
            return None;
        }
        self.filler();
        if !self.eat_char('}', "\"}\"") {
            self.reset(start);
            return None;
        }
        Some(Node::new(
            NodeKind::Pipe {
                start: Box::new(head),
                stages,
            },
            position,
        ))
    }

    fn pipe_start(&mut self) -> Option<Node> {
        if let Some(node) = self.fn_create() {
            return Some(node);
        }
        if let Some(node) = self.map() {
            return Some(node);
        }
        if let Some(node) = self.array() {
            return Some(node);
        }
        if let Some(node) = self.literal() {
            return Some(node);
        }
        self.identifier()
    }

    fn pipe_continue(&mut self) -> Option<Node> {
        if let Some(node) = self.fn_create() {
            return Some(node);
        }
        self.identifier()
    }

    fn call(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if !self.eat_char('{', "\"{\"") {
            return None;
        }
        self.filler();
        let Some(callee) = self.callable() else {
            self.reset(start);
            return None;
        };
        self.filler();
        let params = self.paramset();
        self.filler();
        if !self.eat_char('}', "\"}\"") {
            self.reset(start);
            return None;
        }
        Some(Node::new(
            NodeKind::Call {
                callee: Box::new(callee),
                params,
            },
            position,
        ))
    }

    fn paramset(&mut self) -> Vec<Node> {
        let mut params = Vec::new();
        while let Some(expr) = self.expression() {
            params.push(expr);
            self.filler();
        }
        params
    }

    fn callable(&mut self) -> Option<Node> {
        if let Some(node) = self.fn_create() {
            return Some(node);
        }
        if let Some(node) = self.comparator_op() {
            return Some(node);
        }
        if let Some(node) = self.arithmetic_op() {
            return Some(node);
        }
        self.identifier()
    }

    fn comparator_op(&mut self) -> Option<Node> {
        let position = self.position();
        let table: [(&str, &str); 9] = [
            ("==", "eq"),
            ("!=", "neq"),
            ("<=", "lte"),
            (">=", "gte"),
            ("<", "lt"),
            (">", "gt"),
            ("and", "cmpand"),
            ("or", "cmpor"),
            ("not", "not"),
        ];
        for (symbol, name) in table {
            if self.eat_str(symbol, "comparator") {
                return Some(Node::new(
                    NodeKind::Identifier(Ident::bare(name)),
                    position,
                ));
            }
        }
        None
    }

    fn arithmetic_op(&mut self) -> Option<Node> {
        let position = self.position();
        let table: [(&str, &str); 5] = [
            ("+", "add"),
            ("-", "sub"),
            ("*", "mul"),
            ("/", "div"),
            ("%", "mod"),
        ];
        for (symbol, name) in table {
            if self.eat_str(symbol, "arithmetic operator") {
                return Some(Node::new(
                    NodeKind::Identifier(Ident::bare(name)),
                    position,
                ));
            }
        }
        None
    }

    fn raw(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if !self.eat_str("{`", "\"{`\"") {
            self.reset(start);
            return None;
        }
        match self.take_until('`', '}', "\"`}\"") {
            Some(text) => {
                self.advance();
                self.advance();
                Some(Node::new(NodeKind::Raw(text), position))
            }
            None => {
                self.reset(start);
                None
            }
        }
    }

    fn escape_tag(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if !self.eat_str("{~", "\"{~\"") {
            self.reset(start);
            return None;
        }
        let table: [(&str, EscapeKey); 5] = [
            ("rb", EscapeKey::RightBrace),
            ("lb", EscapeKey::LeftBrace),
            ("s", EscapeKey::Space),
            ("n", EscapeKey::Newline),
            ("r", EscapeKey::CarriageReturn),
        ];
        for (symbol, key) in table {
            let before = self.mark();
            if self.eat_str(symbol, "escape key") && self.eat_char('}', "\"}\"") {
                return Some(Node::new(NodeKind::Escape(key), position));
            }
            self.reset(before);
        }
        self.reset(start);
        None
    }

    fn empty_tag(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if self.eat_char('{', "\"{\"") && self.eat_char('}', "\"}\"") {
            return Some(Node::new(NodeKind::Empty, position));
        }
        self.reset(start);
        None
    }

    fn expression(&mut self) -> Option<Node> {
        if let Some(node) = self.tag() {
            return Some(node);
        }
        if let Some(node) = self.literal() {
            return Some(node);
        }
        if let Some(node) = self.map() {
            return Some(node);
        }
        if let Some(node) = self.array() {
            return Some(node);
        }
        self.identifier()
    }

    fn map(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if self.eat_char('(', "\"(\"")
            && self.eat_char(':', "\":\"")
            && self.eat_char(')', "\")\"")
        {
            return Some(Node::new(NodeKind::Map(Vec::new()), position));
        }
        self.reset(start);

        if !self.eat_char('(', "\"(\"") {
            return None;
        }
        self.filler();
        let mut entries = Vec::new();
        loop {
            let before = self.mark();
            match self.associative_item() {
                Some(entry) => {
                    entries.push(entry);
                    self.filler();
                }
                None => {
                    self.reset(before);
                    break;
                }
            }
        }
        if entries.is_empty() {
            self.reset(start);
            return None;
        }
        self.filler();
        if !self.eat_char(')', "\")\"") {
            self.reset(start);
            return None;
        }
        Some(Node::new(NodeKind::Map(entries), position))
    }

    fn associative_item(&mut self) -> Option<(String, Node)> {
        let start = self.mark();
        if !self.eat_char(':', "\":\"") {
            return None;
        }
        let Some(key) = self.key() else {
            self.reset(start);
            return None;
        };
        self.filler();
        let Some(value) = self.expression() else {
            self.reset(start);
            return None;
        };
        Some((key, value))
    }

    fn array(&mut self) -> Option<Node> {
        let start = self.mark();
        let position = self.position();
        if self.eat_char('(', "\"(\"") && self.eat_char(')', "\")\"") {
            return Some(Node::new(NodeKind::Array(Vec::new()), position));
        }
        self.reset(start);

        if !self.eat_char('(', "\"(\"") {
            return None;
        }
        self.filler();
        let mut items = Vec::new();
        while let Some(expr) = self.expression() {
            items.push(expr);
            self.filler();
        }
        if items.is_empty() {
            self.reset(start);
            return None;
        }
        self.filler();
        if !self.eat_char(')', "\")\"") {
            self.reset(start);
            return None;
        }
        Some(Node::new(NodeKind::Array(items), position))
    }

    fn identifier(&mut self) -> Option<Node> {
        let position = self.position();
        let start = self.mark();

        if let Some(ns) = self.namespace() {
            if self.eat_str("::", "\"::\"") {
                if self.eat_char('.', "\".\"") {
                    return Some(Node::new(
                        NodeKind::Identifier(Ident {
                            namespace: Some(ns),
                            key: None,
                        }),
                        position,
                    ));
                }
                if let Some(key) = self.key() {
                    return Some(Node::new(
                        NodeKind::Identifier(Ident {
                            namespace: Some(ns),
                            key: Some(key),
                        }),
                        position,
                    ));
                }
            }
            self.reset(start);
        }

        let key = self.key()?;
        Some(Node::new(
            NodeKind::Identifier(Ident {
                namespace: None,
                key: Some(key),
            }),
            position,
        ))
    }

    fn namespace(&mut self) -> Option<String> {
        let first = match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() => ch,
            _ => {
                self.fail("namespace");
                return None;
            }
        };
        self.advance();
        let mut name = String::new();
        name.push(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Some(name)
    }

    fn key(&mut self) -> Option<String> {
        let mut key = self.keypart()?;
        loop {
            let before = self.mark();
            if !self.eat_char('.', "\".\"") {
                break;
            }
            match self.keypart() {
                Some(part) => {
                    key.push('.');
                    key.push_str(&part);
                }
                None => {
                    self.reset(before);
                    break;
                }
            }
        }
        Some(key)
    }

    fn keypart(&mut self) -> Option<String> {
        let first = match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '$' || ch == '_' => ch,
            _ => {
                self.fail("identifier");
                return None;
            }
        };
        self.advance();
        let mut part = String::new();
        part.push(first);
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '$' || ch == '_' {
                part.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Some(part)
    }

    fn literal(&mut self) -> Option<Node> {
        let position = self.position();
        if let Some(text) = self.string_literal() {
            return Some(Node::new(NodeKind::Literal(Literal::Str(text)), position));
        }
        if let Some(number) = self.number_literal() {
            return Some(Node::new(NodeKind::Literal(number), position));
        }
        if self.eat_str("true", "\"true\"") {
            return Some(Node::new(
                NodeKind::Literal(Literal::Bool(true)),
                position,
            ));
        }
        if self.eat_str("false", "\"false\"") {
            return Some(Node::new(
                NodeKind::Literal(Literal::Bool(false)),
                position,
            ));
        }
        None
    }

    /// Quoted string, no backslash escaping, terminated by the next quote.
    fn string_literal(&mut self) -> Option<String> {
        let start = self.mark();
        if !self.eat_char('"', "\"\\\"\"") {
            return None;
        }
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return Some(text);
                }
                Some(ch) if Self::is_eol_char(ch) => {
                    self.fail("\"\\\"\"");
                    self.reset(start);
                    return None;
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
                None => {
                    self.fail("\"\\\"\"");
                    self.reset(start);
                    return None;
                }
            }
        }
    }

    fn number_literal(&mut self) -> Option<Literal> {
        let start = self.mark();
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push('-');
            self.advance();
        }
        let mut saw_digit = false;
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.advance();
                saw_digit = true;
            } else {
                break;
            }
        }
        if !saw_digit {
            self.fail("digit");
            self.reset(start);
            return None;
        }

        let before_fraction = self.mark();
        if self.eat_char('.', "\".\"") {
            let mut saw_fraction = false;
            let mut fraction = String::new();
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    fraction.push(ch);
                    self.advance();
                    saw_fraction = true;
                } else {
                    break;
                }
            }
            if saw_fraction {
                text.push('.');
                text.push_str(&fraction);
                return text.parse::<f64>().ok().map(Literal::Float);
            }
            self.reset(before_fraction);
        }

        match text.parse::<i64>() {
            Ok(value) => Some(Literal::Int(value)),
            // Too wide for an integer; keep the numeric value anyway.
            Err(_) => text.parse::<f64>().ok().map(Literal::Float),
        }
    }
}

/// Compute line/column for an offset the same way the cursor does.
fn position_at(chars: &[char], offset: usize) -> Position {
    let mut line = 1usize;
    let mut column = 1usize;
    for index in 0..offset.min(chars.len()) {
        match chars[index] {
            '\n' => {
                if index == 0 || chars[index - 1] != '\r' {
                    line += 1;
                }
                column = 1;
            }
            '\r' | '\u{2028}' | '\u{2029}' => {
                line += 1;
                column = 1;
            }
            _ => column += 1,
        }
    }
    Position::new(line, column)
}
