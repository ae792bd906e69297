//! Whitespace/quote tokenizer for command lines.
//!
//! Double quotes group characters (they may open mid-word), a backslash
//! escapes the next character, and an unterminated quote is not an error:
//! the token simply runs to the end of the line. The `continuable` flag
//! records whether input ended inside a token, which is exactly the case
//! the completion engine must treat as "last token may still grow".

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pub args: Vec<String>,
    pub continuable: bool,
}

impl Args {
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }
}

pub fn split_line(line: &str) -> Args {
    let mut args = Vec::new();
    let mut token = String::new();
    let mut in_token = false;
    let mut in_quote = false;
    let mut escaped = false;

    for ch in line.chars() {
        if escaped {
            token.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => {
                in_token = true;
                escaped = true;
            }
            '"' => {
                in_token = true;
                in_quote = !in_quote;
            }
            c if c.is_whitespace() && !in_quote => {
                if in_token {
                    args.push(std::mem::take(&mut token));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                token.push(c);
            }
        }
    }

    // A trailing backslash is kept literally, like a quote that never
    // closed keeps its span.
    if escaped {
        token.push('\\');
    }
    let continuable = in_token;
    if in_token {
        args.push(token);
    }

    Args { args, continuable }
}
