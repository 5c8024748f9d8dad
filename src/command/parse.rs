//! Quote-aware shell command scanning
//!
//! This is not a shell grammar. It understands quoting and escaping well
//! enough to find control operators and substitutions, and anything it cannot
//! reason about is reported as unsafe.

/// Maximum number of words in a generated prefix
const MAX_PREFIX_WORDS: usize = 3;

/// Characters that end a generated prefix when they appear in a word
const PREFIX_STOP_CHARS: &[char] = &[
    '/', '\\', '.', '*', '?', '[', ']', '{', '}', '$', '~', '=', '<', '>', '\'', '"',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    None,
    Single,
    Double,
}

/// Split a shell command into sub-commands on unquoted control operators.
///
/// Separators are `;`, newline, `|`, `||`, `&&` and a background `&`.
/// Redirections such as `2>&1` and `&>` are not separators. Text inside
/// quotes is literal, so `sqlite3 db "SELECT 1; SELECT 2"` stays whole.
pub fn split_command(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote = QuoteState::None;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    let push_segment = |segments: &mut Vec<String>, current: &mut String| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            segments.push(trimmed.to_string());
        }
        current.clear();
    };

    while let Some(ch) = chars.next() {
        if escaped {
            escaped = false;
            current.push(ch);
            continue;
        }

        match quote {
            QuoteState::Single => {
                if ch == '\'' {
                    quote = QuoteState::None;
                }
                current.push(ch);
            }
            QuoteState::Double => {
                match ch {
                    '\\' => escaped = true,
                    '"' => quote = QuoteState::None,
                    _ => {}
                }
                current.push(ch);
            }
            QuoteState::None => match ch {
                '\\' => {
                    escaped = true;
                    current.push(ch);
                }
                '\'' => {
                    quote = QuoteState::Single;
                    current.push(ch);
                }
                '"' => {
                    quote = QuoteState::Double;
                    current.push(ch);
                }
                ';' | '\n' => push_segment(&mut segments, &mut current),
                '|' => {
                    // `||` and `|&` are consumed whole
                    let _ = chars.next_if(|c| *c == '|' || *c == '&');
                    push_segment(&mut segments, &mut current);
                }
                '&' => {
                    if chars.next_if_eq(&'&').is_some() {
                        push_segment(&mut segments, &mut current);
                    } else if current.ends_with('>') || current.ends_with('<') {
                        // `2>&1`, `<&3`
                        current.push(ch);
                    } else if chars.peek() == Some(&'>') {
                        // `&>file`
                        current.push(ch);
                    } else {
                        push_segment(&mut segments, &mut current);
                    }
                }
                _ => current.push(ch),
            },
        }
    }

    push_segment(&mut segments, &mut current);
    segments
}

/// Tokenize a single command into words, stripping quotes.
///
/// Single quotes are fully literal; inside double quotes a backslash escapes
/// the next character; outside quotes a backslash escapes the next character.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote = QuoteState::None;
    let mut chars = command.chars();

    while let Some(ch) = chars.next() {
        match quote {
            QuoteState::Single => {
                if ch == '\'' {
                    quote = QuoteState::None;
                } else {
                    current.push(ch);
                }
            }
            QuoteState::Double => match ch {
                '"' => quote = QuoteState::None,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                _ => current.push(ch),
            },
            QuoteState::None => match ch {
                '\'' => {
                    quote = QuoteState::Single;
                    in_word = true;
                }
                '"' => {
                    quote = QuoteState::Double;
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        tokens.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if in_word {
        tokens.push(current);
    }

    tokens
}

/// Whether the command contains a command or process substitution
/// (backticks, `$(...)`, `<(...)`, `>(...)`) outside single quotes.
pub fn has_command_substitution(command: &str) -> bool {
    let mut quote = QuoteState::None;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            QuoteState::Single => {
                if ch == '\'' {
                    quote = QuoteState::None;
                }
            }
            QuoteState::Double => match ch {
                '\\' => escaped = true,
                '"' => quote = QuoteState::None,
                '`' => return true,
                '$' if chars.peek() == Some(&'(') => return true,
                _ => {}
            },
            QuoteState::None => match ch {
                '\\' => escaped = true,
                '\'' => quote = QuoteState::Single,
                '"' => quote = QuoteState::Double,
                '`' => return true,
                '$' | '<' | '>' if chars.peek() == Some(&'(') => return true,
                _ => {}
            },
        }
    }

    false
}

/// Whether the command ends inside an open quote
pub fn has_unterminated_quote(command: &str) -> bool {
    let mut quote = QuoteState::None;
    let mut escaped = false;

    for ch in command.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match quote {
            QuoteState::Single => {
                if ch == '\'' {
                    quote = QuoteState::None;
                }
            }
            QuoteState::Double => match ch {
                '\\' => escaped = true,
                '"' => quote = QuoteState::None,
                _ => {}
            },
            QuoteState::None => match ch {
                '\\' => escaped = true,
                '\'' => quote = QuoteState::Single,
                '"' => quote = QuoteState::Double,
                _ => {}
            },
        }
    }

    quote != QuoteState::None
}

/// Whether trusting a static prefix of this command would be unsafe.
///
/// True for compound commands, substitutions and unbalanced quoting. The UI
/// hides "don't ask again" shortcuts for such commands.
pub fn is_unsafe_compound_command(command: &str) -> bool {
    split_command(command).len() > 1
        || has_command_substitution(command)
        || has_unterminated_quote(command)
}

/// All prefixes a user could reasonably grant for this command, from most
/// general to most specific.
///
/// Prefixes are built from leading words and stop at the first flag or at a
/// word that looks like a path, glob, assignment or expansion. Unsafe
/// compound commands have no grantable prefixes.
pub fn generate_command_prefixes(command: &str) -> Vec<String> {
    if is_unsafe_compound_command(command) {
        return Vec::new();
    }

    let tokens = tokenize(command);
    let mut prefixes = Vec::new();
    let mut words: Vec<&str> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() || token.starts_with('-') {
            break;
        }
        if i > 0 && token.contains(PREFIX_STOP_CHARS) {
            break;
        }
        if i == 0 && token.contains('=') {
            break;
        }
        words.push(token);
        prefixes.push(words.join(" "));
        if words.len() == MAX_PREFIX_WORDS {
            break;
        }
    }

    prefixes
}
