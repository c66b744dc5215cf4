//! Scans awk programs and sed scripts for features that reach past the
//! files named on the command line.
//!
//! Both tools are whitelisted for inspection, but their program text can
//! run other programs (`system()`, sed `e`) or read and write arbitrary
//! files (`ARGV` rewrites, `@include`, sed `r`/`w`). Redirections and pipes
//! inside awk programs are already caught by the injection scan; the checks
//! here cover what the scan cannot see.
//!
//! A sed script arrives as a single command line: `;` and newlines never get
//! past the injection scan, so at most one command plus braces is parsed.

/// Awk program fragments that run programs or open files by name.
const AWK_FORBIDDEN: &[&str] = &["system", "ARGV", "ARGC", "@include", "@load"];

/// Sed commands that run programs or touch files other than the input.
const SED_FORBIDDEN_COMMANDS: &[char] = &['e', 'r', 'R', 'w', 'W'];

/// Substitution flags that run the pattern space or write a file.
const SED_FORBIDDEN_FLAGS: &[char] = &['e', 'w'];

/// Sed commands without text arguments; parsing continues after them.
const SED_PLAIN_COMMANDS: &str = "=dDgGhHlLnNpPqQxzF{}";

/// Returns the first forbidden fragment found in any awk argument.
pub(crate) fn awk_hazard(args: &[String]) -> Option<(&str, &'static str)> {
    args.iter().find_map(|argument| {
        AWK_FORBIDDEN
            .iter()
            .find(|fragment| argument.contains(**fragment))
            .map(|fragment| (argument.as_str(), *fragment))
    })
}

/// Returns the first sed script whose command is forbidden, with the
/// offending command or flag letter.
pub(crate) fn sed_hazard(args: &[String]) -> Option<(&str, char)> {
    sed_scripts(args)
        .into_iter()
        .find_map(|script| script_hazard(script).map(|letter| (script, letter)))
}

/// Script arguments of a sed command line: every `-e`/`--expression` value,
/// or the first operand when there are none.
fn sed_scripts(args: &[String]) -> Vec<&str> {
    let mut explicit = Vec::new();
    let mut first_operand = None;
    let mut options_done = false;
    let mut remaining = args.iter();

    while let Some(argument) = remaining.next() {
        if options_done || argument == "-" || !argument.starts_with('-') {
            if first_operand.is_none() {
                first_operand = Some(argument.as_str());
            }
            continue;
        }
        if argument == "--" {
            options_done = true;
            continue;
        }
        if let Some(long) = argument.strip_prefix("--") {
            match long.split_once('=') {
                Some(("expression", script)) => explicit.push(script),
                Some(_) => {}
                None if long == "expression" => {
                    explicit.extend(remaining.next().map(String::as_str));
                }
                None if long == "file" || long == "line-length" => {
                    remaining.next();
                }
                None => {}
            }
            continue;
        }

        let mut letters = argument.chars();
        letters.next();
        while let Some(letter) = letters.next() {
            let attached = letters.as_str();
            match letter {
                'e' => {
                    if attached.is_empty() {
                        explicit.extend(remaining.next().map(String::as_str));
                    } else {
                        explicit.push(attached);
                    }
                    break;
                }
                'f' | 'l' => {
                    if attached.is_empty() {
                        remaining.next();
                    }
                    break;
                }
                'i' => break,
                _ => {}
            }
        }
    }

    if explicit.is_empty() {
        first_operand.into_iter().collect()
    } else {
        explicit
    }
}

fn script_hazard(script: &str) -> Option<char> {
    let mut rest = script;
    loop {
        rest = skip_address(rest.trim_start())
            .trim_start()
            .trim_start_matches(|letter: char| letter == '!' || letter.is_whitespace());
        let mut chars = rest.chars();
        let command = chars.next()?;
        rest = chars.as_str();
        match command {
            letter if SED_FORBIDDEN_COMMANDS.contains(&letter) => return Some(letter),
            's' => {
                let flags = skip_operands(rest, 2)?;
                return flags
                    .chars()
                    .find(|flag| SED_FORBIDDEN_FLAGS.contains(flag));
            }
            'y' => rest = skip_operands(rest, 2)?,
            'b' | 't' | 'T' | ':' => {
                rest = rest
                    .trim_start()
                    .trim_start_matches(|letter: char| !letter.is_whitespace() && letter != '}');
            }
            'a' | 'i' | 'c' | '#' | 'v' => return None,
            letter if SED_PLAIN_COMMANDS.contains(letter) => {}
            // Unknown text usually means the parse went astray on an
            // address; sed would reject it too.
            other => return Some(other),
        }
    }
}

/// Skips one or two addresses and any regex flags.
fn skip_address(script: &str) -> &str {
    let rest = skip_address_point(script);
    rest.strip_prefix(',')
        .map_or(rest, |second| skip_address_point(second.trim_start()))
}

fn skip_address_point(script: &str) -> &str {
    let mut chars = script.chars();
    let rest = match chars.next() {
        Some('/') => skip_delimited(chars.as_str(), '/'),
        Some('\\') => chars
            .next()
            .map_or("", |delimiter| skip_delimited(chars.as_str(), delimiter)),
        Some('$') => chars.as_str(),
        Some(letter) if letter.is_ascii_digit() || letter == '~' || letter == '+' => script
            .trim_start_matches(|digit: char| {
                digit.is_ascii_digit() || digit == '~' || digit == '+'
            }),
        _ => return script,
    };
    rest.trim_start_matches(['I', 'M'])
}

/// Skips `count` delimiter-terminated operands; the delimiter is the first
/// character. Returns `None` for an unterminated operand.
fn skip_operands(text: &str, count: usize) -> Option<&str> {
    let mut chars = text.chars();
    let delimiter = chars.next()?;
    let mut rest = chars.as_str();
    for _ in 0..count {
        let (terminated, after) = split_delimited(rest, delimiter);
        if !terminated {
            return None;
        }
        rest = after;
    }
    Some(rest)
}

fn skip_delimited(text: &str, delimiter: char) -> &str {
    split_delimited(text, delimiter).1
}

/// Consumes text up to an unescaped `delimiter`, returning whether one was
/// found and the text after it.
fn split_delimited(text: &str, delimiter: char) -> (bool, &str) {
    let mut chars = text.chars();
    while let Some(letter) = chars.next() {
        if letter == '\\' {
            chars.next();
        } else if letter == delimiter {
            return (true, chars.as_str());
        }
    }
    (false, "")
}
