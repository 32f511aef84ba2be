//! Always-quoted CSV.
//!
//! Every cell is wrapped in double quotes and embedded quotes are doubled,
//! one `\n`-terminated line per row. [`parse_csv`] reads this back to the
//! exact cells that were written; it also accepts unquoted cells and `\r\n`.

use thiserror::Error;

use crate::query::ResultRow;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CsvError {
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("unexpected quote on line {line}")]
    UnexpectedQuote { line: usize },
}

pub fn write_csv(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        }
        out.push('\n');
    }
    out
}

pub fn parse_csv(input: &str) -> Result<Vec<ResultRow>, CsvError> {
    let mut rows = Vec::new();
    let mut row: ResultRow = Vec::new();
    let mut field = String::new();
    // The current field opened with a quote.
    let mut quoted = false;
    let mut in_quotes = false;
    let mut line = 1;
    let mut quote_line = 1;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() && !quoted => {
                quoted = true;
                in_quotes = true;
                quote_line = line;
            }
            '"' => return Err(CsvError::UnexpectedQuote { line }),
            ',' => {
                row.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if !(row.is_empty() && field.is_empty() && !quoted) {
                    row.push(std::mem::take(&mut field));
                }
                rows.push(std::mem::take(&mut row));
                quoted = false;
                line += 1;
            }
            _ if quoted => return Err(CsvError::UnexpectedQuote { line }),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(CsvError::UnterminatedQuote { line: quote_line });
    }
    if !row.is_empty() || !field.is_empty() || quoted {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}
