//! Cypher recursive descent parser for read queries.
//!
//! Supports:
//! - START with `node($param)` / `node(<id>)` bindings
//! - comma-separated MATCH chains with `->`, `<-`, `-` and `:A|B` types
//! - WHERE with AND / OR / NOT, comparisons and `=~`
//! - ORDER BY before or after RETURN, SKIP, LIMIT
//! - RETURN variables, properties and `count(x)`

use crate::model::{Direction, Value};
use crate::{Error, Result};
use super::ast::*;
use super::lexer::{Token, TokenKind};

/// Parser state: a token slice with a cursor.
struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        let tok = self.peek();
        if tok.kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("Expected {:?}, got {:?} '{}'", kind, tok.kind, tok.text)))
        }
    }

    fn ident(&mut self) -> Result<String> {
        Ok(self.expect(TokenKind::Identifier)?.text.clone())
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, msg: String) -> Error {
        Error::SyntaxError {
            position: self.peek().span.start,
            message: msg,
        }
    }
}

/// Parse a complete read query from tokens.
pub fn parse_query(tokens: &[Token]) -> Result<ReadQuery> {
    if tokens.is_empty() {
        return Err(Error::SyntaxError { position: 0, message: "Empty query".into() });
    }
    let mut p = Parser::new(tokens);
    let mut query = ReadQuery::default();

    if p.eat(TokenKind::Start) {
        query.start.push(parse_start_item(&mut p)?);
        while p.eat(TokenKind::Comma) {
            query.start.push(parse_start_item(&mut p)?);
        }
    }

    while p.eat(TokenKind::Match) {
        query.patterns.push(parse_pattern(&mut p)?);
        while p.eat(TokenKind::Comma) {
            query.patterns.push(parse_pattern(&mut p)?);
        }
    }

    if p.eat(TokenKind::Where) {
        query.where_clause = Some(parse_expr(&mut p)?);
    }

    // ORDER BY is accepted on either side of RETURN.
    if p.at(TokenKind::Order) {
        query.order_by = parse_order_by(&mut p)?;
    }

    p.expect(TokenKind::Return)?;
    query.returns.push(parse_return_item(&mut p)?);
    while p.eat(TokenKind::Comma) {
        query.returns.push(parse_return_item(&mut p)?);
    }

    if p.at(TokenKind::Order) {
        if !query.order_by.is_empty() {
            return Err(p.error("ORDER BY given twice".into()));
        }
        query.order_by = parse_order_by(&mut p)?;
    }
    if p.eat(TokenKind::Skip) {
        query.skip = Some(parse_primary(&mut p)?);
    }
    if p.eat(TokenKind::Limit) {
        query.limit = Some(parse_primary(&mut p)?);
    }

    p.eat(TokenKind::Semicolon);
    if !p.at(TokenKind::Eof) {
        return Err(p.error(format!("Unexpected token after query: {:?}", p.peek_kind())));
    }
    Ok(query)
}

// ============================================================================
// Clauses
// ============================================================================

fn parse_start_item(p: &mut Parser) -> Result<StartItem> {
    let variable = p.ident()?;
    p.expect(TokenKind::Eq)?;
    let func = p.ident()?;
    if !func.eq_ignore_ascii_case("node") {
        return Err(p.error(format!("Unsupported START lookup '{func}'")));
    }
    p.expect(TokenKind::LParen)?;
    let ids = parse_primary(p)?;
    p.expect(TokenKind::RParen)?;
    Ok(StartItem { variable, ids })
}

fn parse_pattern(p: &mut Parser) -> Result<Pattern> {
    let start = parse_node_pattern(p)?;
    let mut steps = Vec::new();
    while p.at(TokenKind::Dash) || p.at(TokenKind::LeftArrow) {
        let rel = parse_rel_pattern(p)?;
        steps.push((rel, parse_node_pattern(p)?));
    }
    Ok(Pattern { start, steps })
}

fn parse_node_pattern(p: &mut Parser) -> Result<NodePattern> {
    p.expect(TokenKind::LParen)?;
    let mut node = NodePattern::default();
    if p.at(TokenKind::Identifier) {
        node.variable = Some(p.ident()?);
    }
    while p.eat(TokenKind::Colon) {
        node.labels.push(p.ident()?);
    }
    p.expect(TokenKind::RParen)?;
    Ok(node)
}

fn parse_rel_pattern(p: &mut Parser) -> Result<RelPattern> {
    // <-[...]- or -[...]-> or -[...]-
    let left_arrow = p.eat(TokenKind::LeftArrow);
    if !left_arrow {
        p.expect(TokenKind::Dash)?;
    }

    let mut variable = None;
    let mut types = Vec::new();
    if p.eat(TokenKind::LBracket) {
        if p.at(TokenKind::Identifier) {
            variable = Some(p.ident()?);
        }
        if p.eat(TokenKind::Colon) {
            types.push(p.ident()?);
            while p.eat(TokenKind::Pipe) {
                p.eat(TokenKind::Colon);
                types.push(p.ident()?);
            }
        }
        p.expect(TokenKind::RBracket)?;
    }

    let direction = if left_arrow {
        p.expect(TokenKind::Dash)?;
        Direction::Incoming
    } else if p.eat(TokenKind::Arrow) {
        Direction::Outgoing
    } else {
        p.expect(TokenKind::Dash)?;
        Direction::Either
    };
    Ok(RelPattern { variable, types, direction })
}

fn parse_return_item(p: &mut Parser) -> Result<ReturnItem> {
    Ok(ReturnItem { expr: parse_expr(p)? })
}

fn parse_order_by(p: &mut Parser) -> Result<Vec<OrderExpr>> {
    p.expect(TokenKind::Order)?;
    p.expect(TokenKind::By)?;
    let mut exprs = vec![parse_order_expr(p)?];
    while p.eat(TokenKind::Comma) {
        exprs.push(parse_order_expr(p)?);
    }
    Ok(exprs)
}

fn parse_order_expr(p: &mut Parser) -> Result<OrderExpr> {
    let expr = parse_expr(p)?;
    let descending = if p.eat(TokenKind::Desc) {
        true
    } else {
        p.eat(TokenKind::Asc);
        false
    };
    Ok(OrderExpr { expr, descending })
}

// ============================================================================
// Expression parsing (precedence climbing)
// ============================================================================

fn parse_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_and_expr(p)?;
    while p.eat(TokenKind::Or) {
        let right = parse_and_expr(p)?;
        left = Expr::Or(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_and_expr(p: &mut Parser) -> Result<Expr> {
    let mut left = parse_not_expr(p)?;
    while p.eat(TokenKind::And) {
        let right = parse_not_expr(p)?;
        left = Expr::And(Box::new(left), Box::new(right));
    }
    Ok(left)
}

fn parse_not_expr(p: &mut Parser) -> Result<Expr> {
    if p.eat(TokenKind::Not) {
        Ok(Expr::Not(Box::new(parse_not_expr(p)?)))
    } else {
        parse_comparison(p)
    }
}

fn parse_comparison(p: &mut Parser) -> Result<Expr> {
    let left = parse_property_access(p)?;

    let op = match p.peek_kind() {
        TokenKind::Eq => CompareOp::Eq,
        TokenKind::Neq => CompareOp::Neq,
        TokenKind::Lt => CompareOp::Lt,
        TokenKind::Lte => CompareOp::Lte,
        TokenKind::Gt => CompareOp::Gt,
        TokenKind::Gte => CompareOp::Gte,
        TokenKind::RegexMatch => CompareOp::Regex,
        _ => return Ok(left),
    };
    p.advance();
    let right = parse_property_access(p)?;
    Ok(Expr::Compare { left: Box::new(left), op, right: Box::new(right) })
}

fn parse_property_access(p: &mut Parser) -> Result<Expr> {
    let mut expr = parse_primary(p)?;
    while p.eat(TokenKind::Dot) {
        let key = p.ident()?;
        expr = Expr::Property { expr: Box::new(expr), key };
    }
    Ok(expr)
}

fn parse_primary(p: &mut Parser) -> Result<Expr> {
    match p.peek_kind() {
        TokenKind::Integer => {
            let tok = p.advance();
            let val = tok.text.parse::<i64>().map_err(|_| {
                Error::SyntaxError { position: tok.span.start, message: "Invalid integer".into() }
            })?;
            Ok(Expr::Literal(Value::Int(val)))
        }
        TokenKind::Float => {
            let tok = p.advance();
            let val = tok.text.parse::<f64>().map_err(|_| {
                Error::SyntaxError { position: tok.span.start, message: "Invalid float".into() }
            })?;
            Ok(Expr::Literal(Value::Float(val)))
        }
        TokenKind::Dash => {
            // Negative numeric literal
            p.advance();
            match parse_primary(p)? {
                Expr::Literal(Value::Int(i)) => Ok(Expr::Literal(Value::Int(-i))),
                Expr::Literal(Value::Float(f)) => Ok(Expr::Literal(Value::Float(-f))),
                _ => Err(p.error("Expected number after '-'".into())),
            }
        }
        TokenKind::StringLiteral => {
            let tok = p.advance();
            Ok(Expr::Literal(Value::String(tok.text.clone())))
        }
        TokenKind::True => {
            p.advance();
            Ok(Expr::Literal(Value::Bool(true)))
        }
        TokenKind::False => {
            p.advance();
            Ok(Expr::Literal(Value::Bool(false)))
        }
        TokenKind::Null => {
            p.advance();
            Ok(Expr::Literal(Value::Null))
        }
        TokenKind::Parameter => {
            let tok = p.advance();
            Ok(Expr::Parameter(tok.text.clone()))
        }
        TokenKind::LParen => {
            p.advance();
            let expr = parse_expr(p)?;
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }
        TokenKind::Identifier => {
            let name = p.ident()?;
            if !p.eat(TokenKind::LParen) {
                return Ok(Expr::Variable(name));
            }
            if !name.eq_ignore_ascii_case("count") {
                return Err(p.error(format!("Unknown function '{name}'")));
            }
            let expr = Expr::Count(Box::new(parse_expr(p)?));
            p.expect(TokenKind::RParen)?;
            Ok(expr)
        }
        kind => Err(p.error(format!("Unexpected token {kind:?} in expression"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::parse;

    #[test]
    fn test_traversal_query() {
        let q = parse(
            "START origin=node($origin_id) \
             MATCH (origin)-[:FRIEND]->(friends), (friends)<-[:PERSON]-() \
             WHERE friends.age > $friends_age \
             ORDER BY friends.name \
             RETURN friends SKIP $skip LIMIT $limit",
        )
        .unwrap();

        assert_eq!(q.start.len(), 1);
        assert_eq!(q.start[0].variable, "origin");
        assert_eq!(q.start[0].ids, Expr::Parameter("origin_id".into()));
        assert_eq!(q.patterns.len(), 2);
        let (rel, node) = &q.patterns[0].steps[0];
        assert_eq!(rel.types, vec!["FRIEND".to_string()]);
        assert_eq!(rel.direction, Direction::Outgoing);
        assert_eq!(node.variable.as_deref(), Some("friends"));
        let (rel, node) = &q.patterns[1].steps[0];
        assert_eq!(rel.direction, Direction::Incoming);
        assert_eq!(node.variable, None);
        assert!(matches!(q.where_clause, Some(Expr::Compare { op: CompareOp::Gt, .. })));
        assert_eq!(q.order_by.len(), 1);
        assert!(!q.order_by[0].descending);
        assert_eq!(q.returns[0].column(), "friends");
        assert_eq!(q.skip, Some(Expr::Parameter("skip".into())));
        assert_eq!(q.limit, Some(Expr::Parameter("limit".into())));
    }

    #[test]
    fn test_order_after_return_and_count() {
        let q = parse("MATCH (a)-[r]-(b) RETURN count(b) ORDER BY a.name DESC LIMIT 3").unwrap();
        assert_eq!(q.returns[0].column(), "count(b)");
        assert!(q.returns[0].expr.is_aggregate());
        assert!(q.order_by[0].descending);
        assert_eq!(q.limit, Some(Expr::Literal(Value::Int(3))));
        assert_eq!(q.patterns[0].steps[0].0.direction, Direction::Either);
    }

    #[test]
    fn test_boolean_precedence() {
        let q = parse("MATCH (n) WHERE NOT n.a = 1 AND n.b =~ 'x.*' OR n.c >= 2 RETURN n").unwrap();
        match q.where_clause {
            Some(Expr::Or(left, right)) => {
                assert!(matches!(*left, Expr::And(..)));
                assert!(matches!(*right, Expr::Compare { op: CompareOp::Gte, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_errors() {
        assert!(parse("MATCH (n)").is_err());
        assert!(parse("START n=rel(1) RETURN n").is_err());
        assert!(parse("ORDER BY n.x RETURN n ORDER BY n.y").is_err());
        assert!(parse("MATCH (n) RETURN frob(n)").is_err());
        assert!(parse("MATCH (n) RETURN DISTINCT n").is_err());
        assert!(parse("MATCH (n) RETURN n AS m").is_err());
        assert!(parse("MATCH (n) WHERE n.a IS NULL RETURN n").is_err());
        assert!(parse("MATCH (n) RETURN id(n)").is_err());
        assert!(parse("MATCH (n) RETURN count(*)").is_err());
    }
}
