//! Recursive-descent parser for BIQL queries.
//!
//! Grammar (condensed):
//!
//! ```text
//! query       := [SELECT proj] [WHERE expr] [GROUP BY ident_list]
//!                [HAVING expr] [ORDER BY order_list] [FORMAT ident]
//!              | expr
//! proj        := DISTINCT? item (',' item)*
//! item        := ('*' | aggregate | field) [AS ident]
//! aggregate   := func '(' [DISTINCT] arg [WHERE expr] ')'
//! expr        := or ; or := and (OR and)* ; and := not (AND? not)*
//! not         := NOT not | '(' expr ')' | cmp
//! cmp         := operand (op value)? | operand IN list | operand LIKE pat
//! ```
//!
//! Adjacent comparisons with no connective compose with AND. Precedence is
//! OR < AND < NOT < comparison. A query consisting only of an expression is
//! `SELECT * WHERE expr`. On failure the parser reports a single error with
//! the offending token's position and what was expected; no partial tree is
//! returned.

use crate::ast::{
    AggregateArg, AggregateCall, AggregateFunc, CompareOp, Expr, FieldPath, Operand, OrderKey,
    Projection, Query, RValue, SelectItem, SelectKind,
};
use crate::error::BiqlError;
use crate::lexer::{tokenize, Keyword, Operator, Token, TokenKind};

/// Parse a query string into its AST.
pub fn parse(source: &str) -> Result<Query, BiqlError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_query()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse_query(&mut self) -> Result<Query, BiqlError> {
        let mut query = Query::default();

        if let TokenKind::Keyword(Keyword::Select) = self.peek().kind {
            self.advance();
            query.select = Some(self.parse_projection()?);
        }

        if self.eat_keyword(Keyword::Where) {
            query.where_clause = Some(self.parse_expr()?);
        } else if query.select.is_none() && self.starts_expression() {
            // Bare predicate form.
            query.where_clause = Some(self.parse_expr()?);
        }

        if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By, "BY after GROUP")?;
            query.group_by = Some(self.parse_field_list()?);
        }

        if self.eat_keyword(Keyword::Having) {
            query.having = Some(self.parse_expr()?);
        }

        if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By, "BY after ORDER")?;
            query.order_by = Some(self.parse_order_list()?);
        }

        if self.eat_keyword(Keyword::Format) {
            query.format = Some(self.expect_identifier("output format name")?);
        }

        if self.peek().kind != TokenKind::Eof {
            return Err(self.error_here("end of query"));
        }
        Ok(query)
    }

    // ---- projection ----

    fn parse_projection(&mut self) -> Result<Projection, BiqlError> {
        let distinct = self.eat_keyword(Keyword::Distinct);
        let mut items = vec![self.parse_select_item()?];
        while self.eat(&TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(Projection { distinct, items })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, BiqlError> {
        let kind = match self.peek().kind.clone() {
            TokenKind::Star => {
                self.advance();
                SelectKind::Wildcard
            }
            TokenKind::Identifier(name) => {
                self.advance();
                if self.peek().kind == TokenKind::LParen {
                    SelectKind::Aggregate(self.parse_aggregate_call(&name)?)
                } else {
                    SelectKind::Field(FieldPath::from_dotted(&name))
                }
            }
            _ => return Err(self.error_here("projection item ('*', a field, or an aggregate)")),
        };

        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.expect_identifier("alias after AS")?)
        } else {
            None
        };
        Ok(SelectItem { kind, alias })
    }

    fn parse_aggregate_call(&mut self, name: &str) -> Result<AggregateCall, BiqlError> {
        let Some(func) = AggregateFunc::from_name(name) else {
            return Err(self.error_here(&format!(
                "a known aggregate function, found '{}' (supported: COUNT, AVG, MAX, MIN, SUM, ARRAY_AGG)",
                name
            )));
        };
        self.expect(&TokenKind::LParen, "'(' after aggregate function")?;

        let distinct = self.eat_keyword(Keyword::Distinct);
        let arg = match self.peek().kind.clone() {
            TokenKind::Star => {
                if distinct {
                    return Err(self.error_here("a field argument (COUNT(DISTINCT *) is not supported)"));
                }
                if func != AggregateFunc::Count {
                    return Err(self.error_here("a field argument ('*' is only valid in COUNT)"));
                }
                self.advance();
                AggregateArg::Star
            }
            TokenKind::Identifier(name) => {
                self.advance();
                AggregateArg::Field(FieldPath::from_dotted(&name))
            }
            _ => return Err(self.error_here("aggregate argument ('*' or a field)")),
        };

        let filter = if self.eat_keyword(Keyword::Where) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.expect(&TokenKind::RParen, "')' to close aggregate")?;
        Ok(AggregateCall {
            func,
            distinct,
            arg,
            filter,
        })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr, BiqlError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, BiqlError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, BiqlError> {
        let mut left = self.parse_not()?;
        loop {
            if self.eat_keyword(Keyword::And) {
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else if self.starts_expression() {
                // Adjacency composes with AND.
                let right = self.parse_not()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr, BiqlError> {
        if self.eat_keyword(Keyword::Not) {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        if self.eat(&TokenKind::LParen) {
            let inner = self.parse_expr()?;
            self.expect(&TokenKind::RParen, "')' to close group")?;
            return Ok(inner);
        }
        self.parse_comparison()
    }

    /// True when the next token can begin a NOT-level expression.
    fn starts_expression(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Identifier(_) | TokenKind::LParen | TokenKind::Keyword(Keyword::Not)
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, BiqlError> {
        let left = self.parse_operand()?;

        match self.peek().kind.clone() {
            TokenKind::Operator(op) => {
                self.advance();
                let op = convert_op(op);
                let right = if op == CompareOp::Match {
                    RValue::Regex(self.parse_regex_text()?)
                } else {
                    self.parse_value()?
                };
                Ok(Expr::Compare { left, op, right })
            }
            TokenKind::Keyword(Keyword::In) => {
                self.advance();
                self.expect(&TokenKind::LBracket, "'[' after IN")?;
                let values = self.parse_value_list()?;
                self.expect(&TokenKind::RBracket, "']' to close IN list")?;
                Ok(Expr::In { left, values })
            }
            TokenKind::Keyword(Keyword::Like) => {
                self.advance();
                let pattern = self.parse_like_pattern()?;
                Ok(Expr::Like { left, pattern })
            }
            _ => Ok(Expr::Exists(left)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, BiqlError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                if self.peek().kind == TokenKind::LParen {
                    Ok(Operand::Aggregate(self.parse_aggregate_call(&name)?))
                } else {
                    Ok(Operand::Field(FieldPath::from_dotted(&name)))
                }
            }
            _ => Err(self.error_here("a field name")),
        }
    }

    fn parse_value(&mut self) -> Result<RValue, BiqlError> {
        match self.peek().kind.clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(RValue::Number(n))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(RValue::Str(s))
            }
            TokenKind::Pattern(p) => {
                self.advance();
                Ok(RValue::Pattern(p))
            }
            TokenKind::Regex(r) => {
                self.advance();
                Ok(RValue::Regex(r))
            }
            TokenKind::Star => {
                self.advance();
                Ok(RValue::Pattern("*".to_string()))
            }
            TokenKind::Question => {
                self.advance();
                Ok(RValue::Pattern("?".to_string()))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(RValue::Null)
            }
            TokenKind::Identifier(raw) => {
                self.advance();
                Ok(RValue::Str(raw))
            }
            TokenKind::LBracket => {
                self.advance();
                self.parse_bracketed_value()
            }
            _ => Err(self.error_here("a value")),
        }
    }

    /// After `[`: either a numeric range `[lo:hi]` or a list `[a, b, ...]`.
    fn parse_bracketed_value(&mut self) -> Result<RValue, BiqlError> {
        let first = self.parse_value()?;
        if self.eat(&TokenKind::Colon) {
            let lo = match first {
                RValue::Number(n) => n,
                _ => return Err(self.error_here("a numeric range bound")),
            };
            let hi = match self.parse_value()? {
                RValue::Number(n) => n,
                _ => return Err(self.error_here("a numeric range bound")),
            };
            self.expect(&TokenKind::RBracket, "']' to close range")?;
            return Ok(RValue::Range(lo, hi));
        }

        let mut values = vec![first];
        while self.eat(&TokenKind::Comma) {
            values.push(self.parse_value()?);
        }
        self.expect(&TokenKind::RBracket, "']' to close list")?;
        Ok(RValue::List(values))
    }

    fn parse_value_list(&mut self) -> Result<Vec<RValue>, BiqlError> {
        let mut values = vec![self.parse_value()?];
        while self.eat(&TokenKind::Comma) {
            values.push(self.parse_value()?);
        }
        Ok(values)
    }

    /// The right side of `~=`: a `/.../` literal or any textual value.
    fn parse_regex_text(&mut self) -> Result<String, BiqlError> {
        match self.peek().kind.clone() {
            TokenKind::Regex(r) => {
                self.advance();
                Ok(r)
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            TokenKind::Identifier(raw) => {
                self.advance();
                Ok(raw)
            }
            TokenKind::Pattern(raw) => {
                self.advance();
                Ok(raw)
            }
            _ => Err(self.error_here("a regex after '~='")),
        }
    }

    /// LIKE patterns use `%`/`_`, which only survive inside quotes.
    fn parse_like_pattern(&mut self) -> Result<String, BiqlError> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            TokenKind::Identifier(raw) => {
                self.advance();
                Ok(raw)
            }
            _ => Err(self.error_here("a pattern string after LIKE")),
        }
    }

    // ---- clause lists ----

    fn parse_field_list(&mut self) -> Result<Vec<FieldPath>, BiqlError> {
        let mut fields = vec![FieldPath::from_dotted(
            &self.expect_identifier("field name")?,
        )];
        while self.eat(&TokenKind::Comma) {
            fields.push(FieldPath::from_dotted(
                &self.expect_identifier("field name")?,
            ));
        }
        Ok(fields)
    }

    fn parse_order_list(&mut self) -> Result<Vec<OrderKey>, BiqlError> {
        let mut keys = vec![self.parse_order_key()?];
        while self.eat(&TokenKind::Comma) {
            keys.push(self.parse_order_key()?);
        }
        Ok(keys)
    }

    fn parse_order_key(&mut self) -> Result<OrderKey, BiqlError> {
        let field = FieldPath::from_dotted(&self.expect_identifier("sort key")?);
        let descending = if self.eat_keyword(Keyword::Desc) {
            true
        } else {
            self.eat_keyword(Keyword::Asc);
            false
        };
        Ok(OrderKey { field, descending })
    }

    // ---- token plumbing ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: &TokenKind, expectation: &str) -> Result<(), BiqlError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error_here(expectation))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, expectation: &str) -> Result<(), BiqlError> {
        self.expect(&TokenKind::Keyword(keyword), expectation)
    }

    fn expect_identifier(&mut self, expectation: &str) -> Result<String, BiqlError> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(expectation)),
        }
    }

    fn error_here(&self, expectation: &str) -> BiqlError {
        let token = self.peek();
        BiqlError::Syntax {
            line: token.line,
            column: token.column,
            message: format!("expected {}, found {}", expectation, describe(&token.kind)),
        }
    }
}

fn convert_op(op: Operator) -> CompareOp {
    match op {
        Operator::Eq => CompareOp::Eq,
        Operator::NotEq => CompareOp::NotEq,
        Operator::Lt => CompareOp::Lt,
        Operator::LtEq => CompareOp::LtEq,
        Operator::Gt => CompareOp::Gt,
        Operator::GtEq => CompareOp::GtEq,
        Operator::Match => CompareOp::Match,
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Identifier(name) => format!("identifier '{}'", name),
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Str(s) => format!("string \"{}\"", s),
        TokenKind::Pattern(p) => format!("pattern '{}'", p),
        TokenKind::Regex(r) => format!("regex /{}/", r),
        TokenKind::Keyword(k) => format!("keyword {:?}", k).to_uppercase(),
        TokenKind::Operator(_) => "operator".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::LBracket => "'['".to_string(),
        TokenKind::RBracket => "']'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Colon => "':'".to_string(),
        TokenKind::Star => "'*'".to_string(),
        TokenKind::Question => "'?'".to_string(),
        TokenKind::Eof => "end of query".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_predicate_becomes_where_clause() {
        let query = parse("sub=01").expect("parse");
        assert!(query.select.is_none());
        assert!(matches!(query.where_clause, Some(Expr::Compare { .. })));
    }

    #[test]
    fn test_full_query_shape() {
        let query = parse(
            "SELECT sub, ses, task, COUNT(*) AS n_runs \
             WHERE datatype=func AND task != rest \
             GROUP BY sub, ses, task \
             HAVING COUNT(*) > 1 \
             ORDER BY sub ASC, n_runs DESC \
             FORMAT table",
        )
        .expect("parse");

        let projection = query.select.expect("projection");
        assert_eq!(projection.items.len(), 4);
        assert_eq!(projection.items[3].column_name(), "n_runs");
        assert_eq!(query.group_by.as_ref().map(|g| g.len()), Some(3));
        assert!(query.having.is_some());
        let order = query.order_by.expect("order");
        assert!(!order[0].descending);
        assert!(order[1].descending);
        assert_eq!(query.format.as_deref(), Some("table"));
    }

    #[test]
    fn test_implicit_and_adjacency() {
        let query = parse("sub=01 task=nback").expect("parse");
        let Some(Expr::And(left, right)) = query.where_clause else {
            panic!("expected AND");
        };
        assert!(matches!(*left, Expr::Compare { .. }));
        assert!(matches!(*right, Expr::Compare { .. }));
    }

    #[test]
    fn test_precedence_or_lower_than_and() {
        // a=1 b=2 OR c=3  parses as  (a=1 AND b=2) OR c=3
        let query = parse("a=1 b=2 OR c=3").expect("parse");
        assert!(matches!(query.where_clause, Some(Expr::Or(_, _))));
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        let query = parse("NOT a=1 b=2").expect("parse");
        let Some(Expr::And(left, _)) = query.where_clause else {
            panic!("expected AND at top");
        };
        assert!(matches!(*left, Expr::Not(_)));
    }

    #[test]
    fn test_parenthesized_or_under_and() {
        let query = parse("(a=1 OR b=2) c=3").expect("parse");
        let Some(Expr::And(left, _)) = query.where_clause else {
            panic!("expected AND at top");
        };
        assert!(matches!(*left, Expr::Or(_, _)));
    }

    #[test]
    fn test_in_list_and_range() {
        let query = parse("sub IN [01, 02, 03] run=[1:3]").expect("parse");
        let Some(Expr::And(left, right)) = query.where_clause else {
            panic!("expected AND");
        };
        assert!(matches!(*left, Expr::In { ref values, .. } if values.len() == 3));
        assert!(
            matches!(*right, Expr::Compare { right: RValue::Range(lo, hi), .. } if lo == 1.0 && hi == 3.0)
        );
    }

    #[test]
    fn test_match_operator_accepts_string_and_slash_forms() {
        for source in ["task ~= \".*back.*\"", "task ~= /.*back.*/"] {
            let query = parse(source).expect("parse");
            assert!(matches!(
                query.where_clause,
                Some(Expr::Compare {
                    op: CompareOp::Match,
                    right: RValue::Regex(_),
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_exists_probe() {
        let query = parse("metadata.EchoTime").expect("parse");
        assert!(matches!(query.where_clause, Some(Expr::Exists(_))));
    }

    #[test]
    fn test_array_agg_with_distinct_and_filter() {
        let query =
            parse("SELECT sub, ARRAY_AGG(DISTINCT task WHERE datatype=func) AS tasks GROUP BY sub")
                .expect("parse");
        let projection = query.select.expect("projection");
        let SelectKind::Aggregate(ref call) = projection.items[1].kind else {
            panic!("expected aggregate");
        };
        assert_eq!(call.func, AggregateFunc::ArrayAgg);
        assert!(call.distinct);
        assert!(call.filter.is_some());
    }

    #[test]
    fn test_count_distinct_star_rejected() {
        let err = parse("SELECT COUNT(DISTINCT *)").expect_err("must fail");
        assert!(matches!(err, BiqlError::Syntax { .. }));
        assert!(err.to_string().contains("COUNT(DISTINCT *)"));
    }

    #[test]
    fn test_unknown_aggregate_rejected() {
        let err = parse("SELECT MEDIAN(age)").expect_err("must fail");
        assert!(err.to_string().contains("MEDIAN"));
    }

    #[test]
    fn test_having_aggregate_operand() {
        let query = parse("SELECT sub GROUP BY sub HAVING COUNT(*) > 1").expect("parse");
        let Some(Expr::Compare { left, .. }) = query.having else {
            panic!("expected comparison");
        };
        assert!(matches!(left, Operand::Aggregate(_)));
    }

    #[test]
    fn test_trailing_garbage_is_an_error() {
        let err = parse("sub=01 )").expect_err("must fail");
        let BiqlError::Syntax { column, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(column, 8);
    }

    #[test]
    fn test_error_position_and_expectation() {
        let err = parse("SELECT sub WHERE task =").expect_err("must fail");
        let BiqlError::Syntax { line, message, .. } = err else {
            panic!("expected syntax error");
        };
        assert_eq!(line, 1);
        assert!(message.contains("expected a value"));
    }

    #[test]
    fn test_empty_query_selects_everything() {
        let query = parse("").expect("parse");
        assert_eq!(query, Query::default());
    }
}
