//! Hand-written lexer and recursive-descent parser for the supported SQL subset.

use crate::ast::*;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Keyword(String),
    Ident(String, bool),
    Number(String),
    String(String),
    Blob(Vec<u8>),
    Parameter(String),
    Operator(String),
    Symbol(char),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn error(&self, detail: impl Into<String>) -> Error {
        let near: String = self.input[self.pos..].chars().take(10).collect();
        Error::Syntax {
            near,
            detail: detail.into(),
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_ws_and_comments();
        let start = self.pos;
        let kind = self.next_kind()?;
        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }

    fn next_kind(&mut self) -> Result<TokenKind> {
        let Some(ch) = self.peek() else {
            return Ok(TokenKind::Eof);
        };

        if (ch == 'x' || ch == 'X') && self.peek_at(1) == Some('\'') {
            self.pos += 1;
            return self.lex_blob();
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let word = self.take_word();
            let upper = word.to_ascii_uppercase();
            if is_keyword(&upper) {
                return Ok(TokenKind::Keyword(upper));
            }
            return Ok(TokenKind::Ident(word.to_string(), false));
        }

        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            return Ok(self.lex_number());
        }

        match ch {
            '\'' => return self.lex_string(),
            '"' => return self.lex_quoted_ident('"', '"'),
            '`' => return self.lex_quoted_ident('`', '`'),
            '[' => return self.lex_quoted_ident('[', ']'),
            '?' => {
                let start = self.pos;
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                return Ok(TokenKind::Parameter(self.input[start..self.pos].to_string()));
            }
            '@' | ':' | '$' => {
                let start = self.pos;
                self.pos += 1;
                if self.take_word().is_empty() {
                    return Err(self.error("empty parameter name"));
                }
                return Ok(TokenKind::Parameter(self.input[start..self.pos].to_string()));
            }
            _ => {}
        }

        let rest = &self.input[self.pos..];
        for op in ["||", ">=", "<=", "<>", "!=", "==", "<<", ">>"] {
            if rest.starts_with(op) {
                self.pos += 2;
                return Ok(TokenKind::Operator(op.to_string()));
            }
        }

        let kind = match ch {
            '(' | ')' | ',' | '.' | ';' => TokenKind::Symbol(ch),
            '*' | '+' | '-' | '/' | '%' | '=' | '<' | '>' | '&' | '|' | '~' => {
                TokenKind::Operator(ch.to_string())
            }
            _ => return Err(self.error(format!("unexpected character '{}'", ch))),
        };
        self.pos += ch.len_utf8();
        Ok(kind)
    }

    fn take_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn take_digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        self.take_digits();
        if self.peek() == Some('.') {
            self.pos += 1;
            self.take_digits();
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.pos += 1;
            }
            if self.take_digits() == 0 {
                self.pos = mark;
            }
        }
        TokenKind::Number(self.input[start..self.pos].to_string())
    }

    fn lex_string(&mut self) -> Result<TokenKind> {
        self.pos += 1;
        let mut value = String::new();
        while let Some(c) = self.peek() {
            if c == '\'' {
                if self.peek_at(1) == Some('\'') {
                    value.push('\'');
                    self.pos += 2;
                } else {
                    self.pos += 1;
                    return Ok(TokenKind::String(value));
                }
            } else {
                value.push(c);
                self.pos += c.len_utf8();
            }
        }
        Err(self.error("unterminated string literal"))
    }

    fn lex_blob(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        let TokenKind::String(hex) = self.lex_string()? else {
            return Err(self.error("malformed blob literal"));
        };
        if hex.len() % 2 != 0 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            self.pos = start;
            return Err(self.error("malformed blob literal"));
        }
        let bytes = (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| self.error("malformed blob literal"))?;
        Ok(TokenKind::Blob(bytes))
    }

    fn lex_quoted_ident(&mut self, open: char, close: char) -> Result<TokenKind> {
        self.pos += open.len_utf8();
        let mut value = String::new();
        while let Some(c) = self.peek() {
            if c == close {
                if open == close && self.peek_at(1) == Some(close) {
                    value.push(close);
                    self.pos += 2;
                } else {
                    self.pos += close.len_utf8();
                    return Ok(TokenKind::Ident(value, true));
                }
            } else {
                value.push(c);
                self.pos += c.len_utf8();
            }
        }
        Err(self.error("unterminated quoted identifier"))
    }

    fn skip_ws_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            let rest = &self.input[self.pos..];
            if rest.starts_with("--") {
                self.pos = rest.find('\n').map_or(self.input.len(), |idx| self.pos + idx + 1);
            } else if rest.starts_with("/*") {
                self.pos = rest.find("*/").map_or(self.input.len(), |idx| self.pos + idx + 2);
            } else if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "SELECT"
            | "FROM"
            | "WHERE"
            | "GROUP"
            | "BY"
            | "HAVING"
            | "ORDER"
            | "LIMIT"
            | "OFFSET"
            | "INSERT"
            | "INTO"
            | "VALUES"
            | "UPDATE"
            | "SET"
            | "DELETE"
            | "CREATE"
            | "TABLE"
            | "DROP"
            | "AS"
            | "DISTINCT"
            | "AND"
            | "OR"
            | "NOT"
            | "NULL"
            | "TRUE"
            | "FALSE"
            | "PRIMARY"
            | "KEY"
            | "AUTOINCREMENT"
            | "UNIQUE"
            | "DEFAULT"
            | "EXISTS"
            | "IN"
            | "IS"
            | "LIKE"
            | "GLOB"
            | "REGEXP"
            | "MATCH"
            | "BETWEEN"
            | "CASE"
            | "WHEN"
            | "THEN"
            | "ELSE"
            | "END"
            | "JOIN"
            | "LEFT"
            | "RIGHT"
            | "FULL"
            | "CROSS"
            | "INNER"
            | "OUTER"
            | "ON"
            | "USING"
            | "ASC"
            | "DESC"
            | "IF"
            | "UNION"
            | "ALL"
            | "INTERSECT"
            | "EXCEPT"
            | "CAST"
    )
}

/// Keywords that can never stand in for a column or function name.
fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "SELECT"
            | "FROM"
            | "WHERE"
            | "GROUP"
            | "BY"
            | "HAVING"
            | "ORDER"
            | "LIMIT"
            | "OFFSET"
            | "VALUES"
            | "SET"
            | "AS"
            | "DISTINCT"
            | "AND"
            | "OR"
            | "NOT"
            | "IN"
            | "IS"
            | "LIKE"
            | "GLOB"
            | "REGEXP"
            | "MATCH"
            | "BETWEEN"
            | "WHEN"
            | "THEN"
            | "ELSE"
            | "END"
            | "JOIN"
            | "ON"
            | "USING"
            | "UNION"
            | "INTERSECT"
            | "EXCEPT"
            | "ALL"
    )
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            input,
            tokens,
            pos: 0,
        }
    }

    fn current(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, detail: impl Into<String>) -> Error {
        let token = &self.tokens[self.pos];
        let near = if matches!(token.kind, TokenKind::Eof) {
            "end of input".to_string()
        } else {
            self.input[token.start..token.end].to_string()
        };
        Error::Syntax {
            near,
            detail: detail.into(),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("expected keyword {}", keyword)))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.current() {
            TokenKind::Keyword(k) if k == keyword => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        match self.current() {
            TokenKind::Symbol(c) if *c == symbol => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", symbol)))
        }
    }

    fn eat_operator(&mut self, op: &str) -> bool {
        match self.current() {
            TokenKind::Operator(o) if o == op => {
                self.advance();
                true
            }
            _ => false,
        }
    }

    fn expect_operator(&mut self, op: &str) -> Result<()> {
        if self.eat_operator(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", op)))
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.current() {
            TokenKind::Keyword(k) if k == "SELECT" => Ok(Statement::Select(self.parse_select()?)),
            TokenKind::Keyword(k) if k == "INSERT" => Ok(Statement::Insert(self.parse_insert()?)),
            TokenKind::Keyword(k) if k == "UPDATE" => Ok(Statement::Update(self.parse_update()?)),
            TokenKind::Keyword(k) if k == "DELETE" => Ok(Statement::Delete(self.parse_delete()?)),
            TokenKind::Keyword(k) if k == "CREATE" => self.parse_create(),
            TokenKind::Keyword(k) if k == "DROP" => self.parse_drop(),
            _ => Err(self.error("unexpected statement")),
        }
    }

    fn parse_create(&mut self) -> Result<Statement> {
        self.expect_keyword("CREATE")?;
        self.expect_keyword("TABLE")?;
        let if_not_exists = self.eat_keyword("IF");
        if if_not_exists {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
        }
        let name = self.parse_object_name()?;
        self.expect_symbol('(')?;
        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            if self.is_table_constraint_start() {
                constraints.push(self.parse_table_constraint()?);
            } else {
                columns.push(self.parse_column_def()?);
            }
            if self.eat_symbol(')') {
                break;
            }
            self.expect_symbol(',')?;
        }
        Ok(Statement::CreateTable(CreateTable {
            if_not_exists,
            name,
            columns,
            constraints,
        }))
    }

    fn parse_drop(&mut self) -> Result<Statement> {
        self.expect_keyword("DROP")?;
        self.expect_keyword("TABLE")?;
        let if_exists = self.eat_keyword("IF");
        if if_exists {
            self.expect_keyword("EXISTS")?;
        }
        let name = self.parse_object_name()?;
        Ok(Statement::DropTable(DropTable { if_exists, name }))
    }

    fn parse_insert(&mut self) -> Result<Insert> {
        self.expect_keyword("INSERT")?;
        self.expect_keyword("INTO")?;
        let table = self.parse_object_name()?;
        let columns = if self.eat_symbol('(') {
            self.parse_ident_list(')')?
        } else {
            Vec::new()
        };
        if self.eat_keyword("VALUES") {
            let mut rows = Vec::new();
            loop {
                self.expect_symbol('(')?;
                let mut values = Vec::new();
                loop {
                    values.push(self.parse_expr()?);
                    if self.eat_symbol(')') {
                        break;
                    }
                    self.expect_symbol(',')?;
                }
                rows.push(values);
                if !self.eat_symbol(',') {
                    break;
                }
            }
            Ok(Insert {
                table,
                columns,
                source: InsertSource::Values(rows),
            })
        } else {
            let select = self.parse_select()?;
            Ok(Insert {
                table,
                columns,
                source: InsertSource::Select(Box::new(select)),
            })
        }
    }

    fn parse_update(&mut self) -> Result<Update> {
        self.expect_keyword("UPDATE")?;
        let table = self.parse_object_name()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.parse_ident()?;
            self.expect_operator("=")?;
            let value = self.parse_expr()?;
            assignments.push(Assignment { column, value });
            if !self.eat_symbol(',') {
                break;
            }
        }
        let selection = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Update {
            table,
            assignments,
            selection,
        })
    }

    fn parse_delete(&mut self) -> Result<Delete> {
        self.expect_keyword("DELETE")?;
        self.expect_keyword("FROM")?;
        let table = self.parse_object_name()?;
        let selection = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Delete { table, selection })
    }

    fn parse_select(&mut self) -> Result<Select> {
        let mut select = self.parse_select_core()?;
        loop {
            let operator = if self.eat_keyword("UNION") {
                if self.eat_keyword("ALL") {
                    CompoundOperator::UnionAll
                } else {
                    CompoundOperator::Union
                }
            } else if self.eat_keyword("INTERSECT") {
                CompoundOperator::Intersect
            } else if self.eat_keyword("EXCEPT") {
                CompoundOperator::Except
            } else {
                break;
            };
            let arm = self.parse_select_core()?;
            select.compounds.push(CompoundSelect {
                operator,
                select: Box::new(arm),
            });
        }
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            select.order_by = self.parse_order_by_list()?;
        }
        if self.eat_keyword("LIMIT") {
            let first = self.parse_expr()?;
            if self.eat_keyword("OFFSET") {
                select.offset = Some(self.parse_expr()?);
                select.limit = Some(first);
            } else if self.eat_symbol(',') {
                select.limit = Some(self.parse_expr()?);
                select.offset = Some(first);
            } else {
                select.limit = Some(first);
            }
        }
        Ok(select)
    }

    fn parse_select_core(&mut self) -> Result<Select> {
        self.expect_keyword("SELECT")?;
        let distinct = self.eat_keyword("DISTINCT");
        if !distinct {
            self.eat_keyword("ALL");
        }
        let projection = self.parse_select_list()?;
        let from = if self.eat_keyword("FROM") {
            self.parse_table_refs()?
        } else {
            Vec::new()
        };
        let selection = if self.eat_keyword("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let group_by = if self.eat_keyword("GROUP") {
            self.expect_keyword("BY")?;
            self.parse_expr_list()?
        } else {
            Vec::new()
        };
        let having = if self.eat_keyword("HAVING") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Select {
            distinct,
            projection,
            from,
            selection,
            group_by,
            having,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            compounds: Vec::new(),
        })
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>> {
        let mut items = Vec::new();
        loop {
            if self.eat_operator("*") {
                items.push(SelectItem::Wildcard);
            } else if self.is_qualified_wildcard() {
                let name = self.parse_qualified_wildcard_name()?;
                items.push(SelectItem::QualifiedWildcard(name));
            } else {
                let start = self.tokens[self.pos].start;
                let expr = self.parse_expr()?;
                let end = self.tokens[self.pos.saturating_sub(1)].end;
                let text = self.input[start..end.max(start)].to_string();
                let alias = if self.eat_keyword("AS") || self.is_alias_start() {
                    Some(self.parse_ident()?)
                } else {
                    None
                };
                items.push(SelectItem::Expr { expr, alias, text });
            }
            if !self.eat_symbol(',') {
                break;
            }
        }
        Ok(items)
    }

    fn parse_table_refs(&mut self) -> Result<Vec<TableRef>> {
        let mut tables = Vec::new();
        loop {
            tables.push(self.parse_table_ref()?);
            if !self.eat_symbol(',') {
                break;
            }
        }
        Ok(tables)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef> {
        let mut left = self.parse_table_factor()?;
        loop {
            let operator = if self.eat_keyword("JOIN") {
                JoinOperator::Inner
            } else if self.eat_keyword("INNER") {
                self.expect_keyword("JOIN")?;
                JoinOperator::Inner
            } else if self.eat_keyword("LEFT") {
                self.eat_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinOperator::Left
            } else if self.eat_keyword("RIGHT") {
                self.eat_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinOperator::Right
            } else if self.eat_keyword("FULL") {
                self.eat_keyword("OUTER");
                self.expect_keyword("JOIN")?;
                JoinOperator::Full
            } else if self.eat_keyword("CROSS") {
                self.expect_keyword("JOIN")?;
                JoinOperator::Cross
            } else {
                break;
            };
            let right = self.parse_table_factor()?;
            let constraint = if self.eat_keyword("ON") {
                Some(JoinConstraint::On(self.parse_expr()?))
            } else if self.eat_keyword("USING") {
                self.expect_symbol('(')?;
                Some(JoinConstraint::Using(self.parse_ident_list(')')?))
            } else {
                None
            };
            left = TableRef::Join {
                left: Box::new(left),
                right: Box::new(right),
                operator,
                constraint,
            };
        }
        Ok(left)
    }

    fn parse_table_factor(&mut self) -> Result<TableRef> {
        if matches!(self.current(), TokenKind::Symbol('(')) {
            return Err(self.error("subqueries in FROM are not supported"));
        }
        let name = self.parse_object_name()?;
        let alias = self.parse_optional_alias()?;
        Ok(TableRef::Named { name, alias })
    }

    fn parse_optional_alias(&mut self) -> Result<Option<Ident>> {
        if self.eat_keyword("AS") || self.is_alias_start() {
            return Ok(Some(self.parse_ident()?));
        }
        Ok(None)
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByExpr>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let asc = if self.eat_keyword("ASC") {
                Some(true)
            } else if self.eat_keyword("DESC") {
                Some(false)
            } else {
                None
            };
            items.push(OrderByExpr { expr, asc });
            if !self.eat_symbol(',') {
                break;
            }
        }
        Ok(items)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_expr()?);
            if !self.eat_symbol(',') {
                break;
            }
        }
        Ok(items)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            expr = binary(expr, BinaryOperator::Or, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_not()?;
        while self.eat_keyword("AND") {
            let right = self.parse_not()?;
            expr = binary(expr, BinaryOperator::And, right);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(self.parse_not()?),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut expr = self.parse_bitwise()?;
        loop {
            let negated = self.eat_keyword("NOT");
            if self.eat_keyword("BETWEEN") {
                let low = self.parse_bitwise()?;
                self.expect_keyword("AND")?;
                let high = self.parse_bitwise()?;
                expr = Expr::Between {
                    expr: Box::new(expr),
                    negated,
                    low: Box::new(low),
                    high: Box::new(high),
                };
                continue;
            }
            if self.eat_keyword("IN") {
                expr = self.parse_in_expr(expr, negated)?;
                continue;
            }
            if let Some(op) = self.parse_match_operator(negated) {
                let right = self.parse_bitwise()?;
                expr = binary(expr, op, right);
                continue;
            }
            if negated {
                if self.eat_keyword("NULL") {
                    expr = Expr::IsNull {
                        expr: Box::new(expr),
                        negated: true,
                    };
                    continue;
                }
                return Err(self.error("unexpected NOT"));
            }
            if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                if self.eat_keyword("NULL") {
                    expr = Expr::IsNull {
                        expr: Box::new(expr),
                        negated,
                    };
                } else {
                    let op = if negated {
                        BinaryOperator::IsNot
                    } else {
                        BinaryOperator::Is
                    };
                    let right = self.parse_bitwise()?;
                    expr = binary(expr, op, right);
                }
                continue;
            }
            if let Some(op) = self.parse_comparison_operator() {
                let right = self.parse_bitwise()?;
                expr = binary(expr, op, right);
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_match_operator(&mut self, negated: bool) -> Option<BinaryOperator> {
        let op = if self.eat_keyword("LIKE") {
            (BinaryOperator::Like, BinaryOperator::NotLike)
        } else if self.eat_keyword("GLOB") {
            (BinaryOperator::Glob, BinaryOperator::NotGlob)
        } else if self.eat_keyword("REGEXP") {
            (BinaryOperator::Regexp, BinaryOperator::NotRegexp)
        } else if self.eat_keyword("MATCH") {
            (BinaryOperator::Match, BinaryOperator::NotMatch)
        } else {
            return None;
        };
        Some(if negated { op.1 } else { op.0 })
    }

    fn parse_bitwise(&mut self) -> Result<Expr> {
        let mut expr = self.parse_add()?;
        loop {
            let op = if self.eat_operator("&") {
                BinaryOperator::BitAnd
            } else if self.eat_operator("|") {
                BinaryOperator::BitOr
            } else if self.eat_operator("<<") {
                BinaryOperator::ShiftLeft
            } else if self.eat_operator(">>") {
                BinaryOperator::ShiftRight
            } else {
                break;
            };
            let right = self.parse_add()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut expr = self.parse_mul()?;
        loop {
            let op = if self.eat_operator("+") {
                BinaryOperator::Plus
            } else if self.eat_operator("-") {
                BinaryOperator::Minus
            } else {
                break;
            };
            let right = self.parse_mul()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut expr = self.parse_concat()?;
        loop {
            let op = if self.eat_operator("*") {
                BinaryOperator::Multiply
            } else if self.eat_operator("/") {
                BinaryOperator::Divide
            } else if self.eat_operator("%") {
                BinaryOperator::Modulo
            } else {
                break;
            };
            let right = self.parse_concat()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_concat(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        while self.eat_operator("||") {
            let right = self.parse_unary()?;
            expr = binary(expr, BinaryOperator::Concat, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = if self.eat_operator("+") {
            UnaryOperator::Plus
        } else if self.eat_operator("-") {
            UnaryOperator::Minus
        } else if self.eat_operator("~") {
            UnaryOperator::BitNot
        } else {
            return self.parse_primary();
        };
        Ok(Expr::UnaryOp {
            op,
            expr: Box::new(self.parse_unary()?),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let literal = match self.current() {
            TokenKind::Keyword(k) if k == "NULL" => Some(Literal::Null),
            TokenKind::Keyword(k) if k == "TRUE" => Some(Literal::Boolean(true)),
            TokenKind::Keyword(k) if k == "FALSE" => Some(Literal::Boolean(false)),
            TokenKind::Number(n) => Some(Literal::Number(n.clone())),
            TokenKind::String(s) => Some(Literal::String(s.clone())),
            TokenKind::Blob(bytes) => Some(Literal::Blob(bytes.clone())),
            _ => None,
        };
        if let Some(literal) = literal {
            self.advance();
            return Ok(Expr::Literal(literal));
        }
        match self.current() {
            TokenKind::Parameter(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::Parameter(name))
            }
            TokenKind::Keyword(k) if k == "CASE" => self.parse_case_expr(),
            TokenKind::Keyword(k) if k == "CAST" => self.parse_cast_expr(),
            TokenKind::Keyword(k) if k == "EXISTS" => Err(self.error("EXISTS is not supported")),
            TokenKind::Keyword(k) if is_reserved(k) => Err(self.error("unexpected keyword")),
            TokenKind::Ident(_, _) | TokenKind::Keyword(_) => self.parse_ident_or_function(),
            TokenKind::Symbol('(') => self.parse_paren_expr_or_subquery(),
            TokenKind::Operator(op) if op == "*" => {
                self.advance();
                Ok(Expr::Wildcard)
            }
            _ => Err(self.error("unexpected token in expression")),
        }
    }

    fn parse_ident_or_function(&mut self) -> Result<Expr> {
        let name = self.parse_ident()?;
        if self.eat_symbol('.') {
            let mut parts = vec![name];
            loop {
                parts.push(self.parse_ident()?);
                if !self.eat_symbol('.') {
                    break;
                }
            }
            return Ok(Expr::CompoundIdentifier(parts));
        }
        if self.eat_symbol('(') {
            let distinct = self.eat_keyword("DISTINCT");
            let mut args = Vec::new();
            if !self.eat_symbol(')') {
                loop {
                    args.push(self.parse_expr()?);
                    if self.eat_symbol(')') {
                        break;
                    }
                    self.expect_symbol(',')?;
                }
            }
            return Ok(Expr::Function {
                name,
                args,
                distinct,
            });
        }
        Ok(Expr::Identifier(name))
    }

    fn parse_cast_expr(&mut self) -> Result<Expr> {
        self.expect_keyword("CAST")?;
        self.expect_symbol('(')?;
        let expr = self.parse_expr()?;
        self.expect_keyword("AS")?;
        let type_name = self.parse_type_name()?;
        self.expect_symbol(')')?;
        Ok(Expr::Cast {
            expr: Box::new(expr),
            type_name,
        })
    }

    fn parse_case_expr(&mut self) -> Result<Expr> {
        self.expect_keyword("CASE")?;
        let operand = if self.current_is_keyword("WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let mut when_then = Vec::new();
        while self.eat_keyword("WHEN") {
            let condition = self.parse_expr()?;
            self.expect_keyword("THEN")?;
            let result = self.parse_expr()?;
            when_then.push((condition, result));
        }
        if when_then.is_empty() {
            return Err(self.error("CASE without WHEN"));
        }
        let else_result = if self.eat_keyword("ELSE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expr::Case {
            operand,
            when_then,
            else_result,
        })
    }

    fn parse_paren_expr_or_subquery(&mut self) -> Result<Expr> {
        self.expect_symbol('(')?;
        if self.current_is_keyword("SELECT") {
            let select = self.parse_select()?;
            self.expect_symbol(')')?;
            return Ok(Expr::Subquery(Box::new(select)));
        }
        let expr = self.parse_expr()?;
        self.expect_symbol(')')?;
        Ok(Expr::Nested(Box::new(expr)))
    }

    fn parse_in_expr(&mut self, left: Expr, negated: bool) -> Result<Expr> {
        self.expect_symbol('(')?;
        if self.current_is_keyword("SELECT") {
            let select = self.parse_select()?;
            self.expect_symbol(')')?;
            return Ok(Expr::InSubquery {
                expr: Box::new(left),
                subquery: Box::new(select),
                negated,
            });
        }
        let mut list = Vec::new();
        if !self.eat_symbol(')') {
            loop {
                list.push(self.parse_expr()?);
                if self.eat_symbol(')') {
                    break;
                }
                self.expect_symbol(',')?;
            }
        }
        Ok(Expr::InList {
            expr: Box::new(left),
            list,
            negated,
        })
    }

    fn parse_comparison_operator(&mut self) -> Option<BinaryOperator> {
        let op = match self.current() {
            TokenKind::Operator(op) => match op.as_str() {
                "=" | "==" => BinaryOperator::Eq,
                "!=" | "<>" => BinaryOperator::NotEq,
                "<" => BinaryOperator::Lt,
                "<=" => BinaryOperator::LtEq,
                ">" => BinaryOperator::Gt,
                ">=" => BinaryOperator::GtEq,
                _ => return None,
            },
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_object_name(&mut self) -> Result<ObjectName> {
        let mut parts = vec![self.parse_ident()?];
        while self.eat_symbol('.') {
            parts.push(self.parse_ident()?);
        }
        Ok(ObjectName(parts))
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let ident = match self.current() {
            TokenKind::Ident(value, quoted) => Ident {
                value: value.clone(),
                quoted: *quoted,
            },
            TokenKind::Keyword(value) => Ident::new(value.clone()),
            TokenKind::String(value) => Ident {
                value: value.clone(),
                quoted: true,
            },
            _ => return Err(self.error("expected identifier")),
        };
        self.advance();
        Ok(ident)
    }

    fn parse_ident_list(&mut self, terminator: char) -> Result<Vec<Ident>> {
        let mut items = Vec::new();
        loop {
            items.push(self.parse_ident()?);
            if self.eat_symbol(terminator) {
                break;
            }
            self.expect_symbol(',')?;
        }
        Ok(items)
    }

    fn parse_qualified_wildcard_name(&mut self) -> Result<ObjectName> {
        let mut parts = vec![self.parse_ident()?];
        while !matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::Operator(op)) if op == "*"
        ) {
            self.expect_symbol('.')?;
            parts.push(self.parse_ident()?);
        }
        self.expect_symbol('.')?;
        self.expect_operator("*")?;
        Ok(ObjectName(parts))
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.parse_ident()?;
        let type_name = if self.is_column_constraint_start() || !self.is_ident_like() {
            None
        } else {
            Some(self.parse_type_name()?)
        };
        let mut constraints = Vec::new();
        loop {
            if self.eat_keyword("NOT") {
                self.expect_keyword("NULL")?;
                constraints.push(ColumnConstraint::NotNull);
            } else if self.eat_keyword("NULL") {
                constraints.push(ColumnConstraint::Null);
            } else if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                if !self.eat_keyword("ASC") {
                    self.eat_keyword("DESC");
                }
                let autoincrement = self.eat_keyword("AUTOINCREMENT");
                constraints.push(ColumnConstraint::PrimaryKey { autoincrement });
            } else if self.eat_keyword("UNIQUE") {
                constraints.push(ColumnConstraint::Unique);
            } else if self.eat_keyword("DEFAULT") {
                let expr = if self.eat_symbol('(') {
                    let expr = self.parse_expr()?;
                    self.expect_symbol(')')?;
                    expr
                } else {
                    self.parse_unary()?
                };
                constraints.push(ColumnConstraint::Default(expr));
            } else {
                break;
            }
        }
        Ok(ColumnDef {
            name,
            type_name,
            constraints,
        })
    }

    fn parse_table_constraint(&mut self) -> Result<TableConstraint> {
        if self.eat_keyword("PRIMARY") {
            self.expect_keyword("KEY")?;
            self.expect_symbol('(')?;
            return Ok(TableConstraint::PrimaryKey(self.parse_ident_list(')')?));
        }
        self.expect_keyword("UNIQUE")?;
        self.expect_symbol('(')?;
        Ok(TableConstraint::Unique(self.parse_ident_list(')')?))
    }

    fn parse_type_name(&mut self) -> Result<String> {
        let mut parts = vec![self.parse_ident()?.value];
        while self.is_ident_like() && !self.is_column_constraint_start() {
            parts.push(self.parse_ident()?.value);
        }
        let mut type_name = parts.join(" ");
        if self.eat_symbol('(') {
            let mut sizes = Vec::new();
            loop {
                match self.current() {
                    TokenKind::Number(n) => {
                        sizes.push(n.clone());
                        self.advance();
                    }
                    _ => return Err(self.error("expected type size")),
                }
                if self.eat_symbol(')') {
                    break;
                }
                self.expect_symbol(',')?;
            }
            type_name.push_str(&format!("({})", sizes.join(",")));
        }
        Ok(type_name)
    }

    fn is_column_constraint_start(&self) -> bool {
        matches!(
            self.current(),
            TokenKind::Keyword(k)
                if k == "NOT"
                    || k == "NULL"
                    || k == "PRIMARY"
                    || k == "UNIQUE"
                    || k == "DEFAULT"
        )
    }

    fn is_table_constraint_start(&self) -> bool {
        matches!(
            self.current(),
            TokenKind::Keyword(k) if k == "PRIMARY" || k == "UNIQUE"
        )
    }

    fn is_ident_like(&self) -> bool {
        matches!(self.current(), TokenKind::Ident(_, _) | TokenKind::Keyword(_))
    }

    fn is_alias_start(&self) -> bool {
        matches!(self.current(), TokenKind::Ident(_, _))
    }

    fn is_qualified_wildcard(&self) -> bool {
        if !self.is_ident_like() {
            return false;
        }
        let mut idx = self.pos;
        loop {
            let dot = self.tokens.get(idx + 1).map(|t| &t.kind);
            let next = self.tokens.get(idx + 2).map(|t| &t.kind);
            match (dot, next) {
                (Some(TokenKind::Symbol('.')), Some(TokenKind::Ident(_, _)))
                | (Some(TokenKind::Symbol('.')), Some(TokenKind::Keyword(_))) => idx += 2,
                (Some(TokenKind::Symbol('.')), Some(TokenKind::Operator(op))) if op == "*" => {
                    return true;
                }
                _ => return false,
            }
        }
    }

    fn current_is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), TokenKind::Keyword(k) if k == keyword)
    }
}

fn binary(left: Expr, op: BinaryOperator, right: Expr) -> Expr {
    Expr::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Parse a single SQL statement. A trailing `;` is accepted.
pub fn parse_statement(input: &str) -> Result<Statement> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    let mut parser = Parser::new(input, tokens);
    let stmt = parser.parse_statement()?;
    while parser.eat_symbol(';') {}
    if !matches!(parser.current(), TokenKind::Eof) {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(stmt)
}
