//! Parse rule source into an Abstract Syntax Tree (AST).

use thiserror::Error;

use super::lexer::{tokenize, Spanned, Token};

/// Nesting limit for blocks and parenthesised expressions
const MAX_DEPTH: usize = 64;

/// Parse errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unrecognised character at offset {0}")]
    InvalidCharacter(usize),

    #[error("unexpected token at offset {offset}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("unexpected end of input: expected {0}")]
    UnexpectedEof(String),

    #[error("unknown transaction field '{0}'")]
    UnknownField(String),

    #[error("rule nests deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// Transaction fields readable from a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sender,
    Recipient,
    Amount,
}

impl Field {
    fn from_name(name: &str) -> Result<Self> {
        match name {
            "sender" => Ok(Field::Sender),
            "recipient" => Ok(Field::Recipient),
            "amount" => Ok(Field::Amount),
            other => Err(ParseError::UnknownField(other.to_string())),
        }
    }
}

/// Outcome selected by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Field(Field),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    Decide(Decision),
}

/// A parsed rule body
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// Parses rule source
pub fn parse(source: &str) -> Result<Program> {
    let tokens = tokenize(source).map_err(ParseError::InvalidCharacter)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    let mut statements = Vec::new();
    while !parser.at_end() {
        statements.push(parser.statement()?);
    }

    Ok(Program { statements })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.advance() {
            Some(spanned) if spanned.token == token => Ok(()),
            Some(spanned) => Err(ParseError::UnexpectedToken {
                expected: format!("{:?}", token),
                found: format!("{:?}", spanned.token),
                offset: spanned.offset,
            }),
            None => Err(ParseError::UnexpectedEof(format!("{:?}", token))),
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn statement(&mut self) -> Result<Stmt> {
        match self.advance() {
            Some(Spanned { token: Token::If, .. }) => self.if_statement(),
            Some(Spanned { token: Token::Approve, .. }) => self.decision(Decision::Approve),
            Some(Spanned { token: Token::Reject, .. }) => self.decision(Decision::Reject),
            Some(spanned) => Err(ParseError::UnexpectedToken {
                expected: "statement".to_string(),
                found: format!("{:?}", spanned.token),
                offset: spanned.offset,
            }),
            None => Err(ParseError::UnexpectedEof("statement".to_string())),
        }
    }

    fn decision(&mut self, decision: Decision) -> Result<Stmt> {
        self.expect(Token::LParen)?;
        self.expect(Token::RParen)?;
        self.eat(&Token::Semicolon);
        Ok(Stmt::Decide(decision))
    }

    // `if` has already been consumed
    fn if_statement(&mut self) -> Result<Stmt> {
        self.enter()?;
        let condition = self.expression()?;
        let then_branch = self.block()?;

        let else_branch = if self.eat(&Token::Else) {
            if self.eat(&Token::If) {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        self.leave();

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.at_end() {
                return Err(ParseError::UnexpectedEof("}".to_string()));
            }
            statements.push(self.statement()?);
        }
        Ok(statements)
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut left = self.and_expression()?;
        while self.eat(&Token::Or) {
            let right = self.and_expression()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Expr> {
        let mut left = self.not_expression()?;
        while self.eat(&Token::And) {
            let right = self.not_expression()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expression(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let inner = self.not_expression()?;
            self.leave();
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.term()?;

        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;

        let right = self.term()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn term(&mut self) -> Result<Expr> {
        let spanned = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof("expression".to_string()))?;

        match spanned.token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Ident(name) => Ok(Expr::Field(Field::from_name(&name)?)),
            Token::Transaction => self.transaction_field(),
            Token::LParen => {
                self.enter()?;
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                self.leave();
                Ok(inner)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: format!("{:?}", other),
                offset: spanned.offset,
            }),
        }
    }

    // `transaction.amount` or `transaction['amount']`
    fn transaction_field(&mut self) -> Result<Expr> {
        let spanned = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof("field access".to_string()))?;

        let name = match spanned.token {
            Token::Dot => match self.advance() {
                Some(Spanned { token: Token::Ident(name), .. }) => name,
                Some(other) => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "field name".to_string(),
                        found: format!("{:?}", other.token),
                        offset: other.offset,
                    })
                }
                None => return Err(ParseError::UnexpectedEof("field name".to_string())),
            },
            Token::LBracket => {
                let name = match self.advance() {
                    Some(Spanned { token: Token::Str(name), .. }) => name,
                    Some(other) => {
                        return Err(ParseError::UnexpectedToken {
                            expected: "quoted field name".to_string(),
                            found: format!("{:?}", other.token),
                            offset: other.offset,
                        })
                    }
                    None => return Err(ParseError::UnexpectedEof("quoted field name".to_string())),
                };
                self.expect(Token::RBracket)?;
                name
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "'.' or '['".to_string(),
                    found: format!("{:?}", other),
                    offset: spanned.offset,
                })
            }
        };

        Ok(Expr::Field(Field::from_name(&name)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_if_else() {
        let program = parse("if transaction.amount > 100 { reject() } else { approve() }").unwrap();

        assert_eq!(
            program.statements,
            vec![Stmt::If {
                condition: Expr::Compare(
                    CmpOp::Gt,
                    Box::new(Expr::Field(Field::Amount)),
                    Box::new(Expr::Number(100.0)),
                ),
                then_branch: vec![Stmt::Decide(Decision::Reject)],
                else_branch: vec![Stmt::Decide(Decision::Approve)],
            }]
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let program = parse("if a_is_fine or amount < 1 and sender == '0' { approve() }");
        assert_eq!(program, Err(ParseError::UnknownField("a_is_fine".to_string())));

        let program = parse("if true or amount < 1 and sender == '0' { approve() }").unwrap();
        match &program.statements[0] {
            Stmt::If { condition: Expr::Or(left, right), .. } => {
                assert_eq!(**left, Expr::Bool(true));
                assert!(matches!(**right, Expr::And(_, _)));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain() {
        let program = parse(
            "if amount > 10 { reject(); } else if sender == 'mallory' { reject(); } else { approve(); }",
        )
        .unwrap();

        match &program.statements[0] {
            Stmt::If { else_branch, .. } => {
                assert!(matches!(else_branch.as_slice(), [Stmt::If { .. }]));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_subscript_field_access() {
        let program = parse("if transaction['recipient'] == \"bob\" { approve() }").unwrap();
        match &program.statements[0] {
            Stmt::If { condition: Expr::Compare(CmpOp::Eq, left, _), .. } => {
                assert_eq!(**left, Expr::Field(Field::Recipient));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("if amount > { approve() }"), Err(ParseError::UnexpectedToken { .. })));
        assert!(matches!(parse("if amount > 1 { approve()"), Err(ParseError::UnexpectedEof(_))));
        assert!(matches!(parse("approve"), Err(ParseError::UnexpectedEof(_))));
        assert_eq!(parse("if transaction.balance > 1 { approve() }"), Err(ParseError::UnknownField("balance".to_string())));
        assert_eq!(parse("approve() $"), Err(ParseError::InvalidCharacter(10)));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("if {}true{} {{ approve() }}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&deep), Err(ParseError::TooDeep));
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(parse("   ").unwrap().statements, Vec::new());
    }
}
