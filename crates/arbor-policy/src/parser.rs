//! Recursive-descent parser for policy modules and query strings.

use crate::ast::{Expr, Module, PathSeg, Rule, Stmt};
use crate::error::{PolicyError, PolicyResult};
use crate::lexer::{tokenize, Token};

/// Parse a module's source text.
pub fn parse_module(name: &str, source: &str) -> PolicyResult<Module> {
    let tokens = tokenize(source, name)?;
    let mut parser = Parser {
        module: name.to_string(),
        tokens,
        pos: 0,
    };
    parser.module()
}

/// Parse a query string: `binding = data.pkg.rule` pairs separated by `;`.
pub fn parse_query(source: &str) -> PolicyResult<Vec<(String, Expr)>> {
    let tokens = tokenize(source, "<query>").map_err(|e| PolicyError::BadQuery {
        reason: e.to_string(),
    })?;
    let mut parser = Parser {
        module: "<query>".to_string(),
        tokens,
        pos: 0,
    };
    parser.query().map_err(|e| PolicyError::BadQuery {
        reason: e.to_string(),
    })
}

struct Parser {
    module: String,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn fail<T>(&self, reason: impl Into<String>) -> PolicyResult<T> {
        Err(PolicyError::Compile {
            module: self.module.clone(),
            reason: reason.into(),
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> PolicyResult<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            self.fail(format!("expected {expected:?}, found {:?}", self.peek()))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn ident(&mut self) -> PolicyResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => self.fail(format!("expected identifier, found {other:?}")),
        }
    }

    // -- modules ---------------------------------------------------------

    fn module(&mut self) -> PolicyResult<Module> {
        self.skip_newlines();
        self.expect(&Token::Package)?;
        let mut package = self.ident()?;
        while self.eat(&Token::Dot) {
            package.push('.');
            package.push_str(&self.ident()?);
        }

        let mut rules = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek().is_none() {
                break;
            }
            rules.push(self.rule()?);
        }

        Ok(Module { package, rules })
    }

    fn rule(&mut self) -> PolicyResult<Rule> {
        if self.eat(&Token::Default) {
            let name = self.ident()?;
            self.expect(&Token::Assign)?;
            let value = self.expr()?;
            return Ok(Rule {
                name,
                is_default: true,
                value: Some(value),
                body: Vec::new(),
            });
        }

        let name = self.ident()?;
        let value = if self.eat(&Token::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        let body = if self.eat(&Token::LBrace) {
            self.body(&Token::RBrace)?
        } else if value.is_some() {
            Vec::new() // constant rule
        } else {
            return self.fail(format!("rule {name} has neither value nor body"));
        };

        Ok(Rule {
            name,
            is_default: false,
            value,
            body,
        })
    }

    /// Parse statements up to (and consuming) `terminator`.
    fn body(&mut self, terminator: &Token) -> PolicyResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            while self.eat(&Token::Newline) || self.eat(&Token::Semicolon) {}
            if self.eat(terminator) {
                break;
            }
            if self.peek().is_none() {
                return self.fail(format!("unterminated body, expected {terminator:?}"));
            }
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn stmt(&mut self) -> PolicyResult<Stmt> {
        if self.eat(&Token::Not) {
            return Ok(Stmt::Not(self.expr()?));
        }

        // `ident := expr` local binding.
        if let (Some(Token::Ident(name)), Some(Token::Bind)) =
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1))
        {
            let name = name.clone();
            self.pos += 2;
            return Ok(Stmt::Bind(name, self.expr()?));
        }

        let left = self.expr()?;
        if self.eat(&Token::Eq) {
            Ok(Stmt::Eq(left, self.expr()?))
        } else if self.eat(&Token::Neq) {
            Ok(Stmt::Neq(left, self.expr()?))
        } else {
            Ok(Stmt::Expr(left))
        }
    }

    // -- expressions -----------------------------------------------------

    fn expr(&mut self) -> PolicyResult<Expr> {
        let base = match self.next() {
            Some(Token::Str(s)) => Expr::Str(s),
            Some(Token::Int(i)) => Expr::Int(i),
            Some(Token::Float(f)) => Expr::Float(f),
            Some(Token::True) => Expr::Bool(true),
            Some(Token::False) => Expr::Bool(false),
            Some(Token::Null) => Expr::Null,
            Some(Token::LBracket) => self.array_or_comprehension()?,
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.next();
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            self.expect(&Token::Comma)?;
                        }
                    }
                    Expr::Call { name, args }
                } else {
                    Expr::Ref {
                        root: name,
                        path: Vec::new(),
                    }
                }
            }
            other => return self.fail(format!("expected expression, found {other:?}")),
        };
        self.postfix(base)
    }

    fn postfix(&mut self, base: Expr) -> PolicyResult<Expr> {
        let mut expr = base;
        loop {
            if self.eat(&Token::Dot) {
                let key = self.ident()?;
                expr = self.push_seg(expr, PathSeg::Key(key))?;
            } else if self.eat(&Token::LBracket) {
                let seg = match self.next() {
                    Some(Token::Underscore) => PathSeg::Wildcard,
                    Some(Token::Int(i)) => PathSeg::Index(i),
                    Some(Token::Str(s)) => PathSeg::Key(s),
                    other => {
                        return self.fail(format!("expected index, found {other:?}"));
                    }
                };
                self.expect(&Token::RBracket)?;
                expr = self.push_seg(expr, seg)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn push_seg(&self, expr: Expr, seg: PathSeg) -> PolicyResult<Expr> {
        match expr {
            Expr::Ref { root, mut path } => {
                path.push(seg);
                Ok(Expr::Ref { root, path })
            }
            other => self.fail(format!("cannot index into {other:?}")),
        }
    }

    fn array_or_comprehension(&mut self) -> PolicyResult<Expr> {
        self.skip_newlines();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Array(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat(&Token::Pipe) {
            let body = self.body(&Token::RBracket)?;
            return Ok(Expr::Comprehension {
                head: Box::new(first),
                body,
            });
        }
        let mut items = vec![first];
        loop {
            self.skip_newlines();
            if self.eat(&Token::RBracket) {
                break;
            }
            self.expect(&Token::Comma)?;
            self.skip_newlines();
            if self.eat(&Token::RBracket) {
                break; // trailing comma
            }
            items.push(self.expr()?);
        }
        Ok(Expr::Array(items))
    }

    // -- queries ---------------------------------------------------------

    fn query(&mut self) -> PolicyResult<Vec<(String, Expr)>> {
        let mut bindings = Vec::new();
        loop {
            self.skip_newlines();
            if self.peek().is_none() {
                break;
            }
            let name = self.ident()?;
            self.expect(&Token::Assign)?;
            let target = self.expr()?;
            bindings.push((name, target));
            self.skip_newlines();
            if !self.eat(&Token::Semicolon) {
                break;
            }
        }
        if self.peek().is_some() {
            return self.fail(format!("trailing tokens at {:?}", self.peek()));
        }
        Ok(bindings)
    }
}
