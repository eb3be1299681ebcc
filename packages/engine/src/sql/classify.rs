use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::errors;
use crate::LixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, pragmas, transaction control and anything else that is passed
    /// through untouched.
    Other,
}

impl StatementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Other => "other",
        }
    }
}

/// One statement of a script, as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
    pub sql: String,
    pub kind: StatementKind,
}

/// Splits `sql` at top-level semicolons and classifies every non-empty
/// statement.
pub fn classify_statements(sql: &str) -> Result<Vec<ClassifiedStatement>, LixError> {
    let tokens = Tokenizer::new(&GenericDialect {}, sql)
        .tokenize()
        .map_err(|error| errors::sql_parse_error(&error.to_string()))?;

    let mut statements = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    for token in tokens {
        match &token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::SemiColon if depth == 0 => {
                push_statement(&mut statements, std::mem::take(&mut current));
                continue;
            }
            Token::EOF => continue,
            _ => {}
        }
        current.push(token);
    }
    push_statement(&mut statements, current);
    Ok(statements)
}

fn push_statement(statements: &mut Vec<ClassifiedStatement>, tokens: Vec<Token>) {
    if tokens.iter().all(|token| matches!(token, Token::Whitespace(_))) {
        return;
    }
    let kind = classify_tokens(&tokens);
    let sql = tokens.iter().map(ToString::to_string).collect::<String>();
    statements.push(ClassifiedStatement {
        sql: sql.trim().to_string(),
        kind,
    });
}

/// The kind is decided by the first statement keyword at nesting depth 0.
/// A leading `WITH` block is skipped; its bodies sit at depth 1 or deeper.
fn classify_tokens(tokens: &[Token]) -> StatementKind {
    let mut depth = 0usize;
    let mut in_cte_prefix = false;
    let mut first_word = true;
    for token in tokens {
        match token {
            Token::LParen => {
                depth += 1;
                continue;
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                continue;
            }
            Token::Word(word) => {
                if depth > 0 && !(first_word && word.keyword == Keyword::SELECT) {
                    continue;
                }
                let leading = first_word;
                first_word = false;
                match word.keyword {
                    Keyword::SELECT | Keyword::VALUES => return StatementKind::Select,
                    Keyword::INSERT | Keyword::REPLACE => return StatementKind::Insert,
                    Keyword::UPDATE => return StatementKind::Update,
                    Keyword::DELETE => return StatementKind::Delete,
                    Keyword::WITH if leading => in_cte_prefix = true,
                    _ if in_cte_prefix => {}
                    _ => return StatementKind::Other,
                }
            }
            _ => {}
        }
    }
    StatementKind::Other
}
