use std::collections::{HashMap, HashSet};

use anyhow::{bail, Result};

/// Command-line arguments split into options, flags and positionals.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedArgs {
    /// `--key value`, `--key=value` and `-k value`, keyed without dashes
    pub options: HashMap<String, String>,
    /// Value-less switches such as `--verbose`
    pub flags: HashSet<String>,
    pub positional: Vec<String>,
}

impl ParsedArgs {
    pub fn get(&self, long: &str, short: &str) -> Option<&str> {
        self.options
            .get(long)
            .or_else(|| self.options.get(short))
            .map(String::as_str)
    }

    pub fn has_flag(&self, long: &str, short: &str) -> bool {
        self.flags.contains(long) || self.flags.contains(short)
    }
}

fn process_option(
    prefix: &str,
    args: &[String],
    i: usize,
    flag_names: &[&str],
    parsed: &mut ParsedArgs,
) -> Result<usize> {
    let arg = &args[i];
    let key = arg.trim_start_matches(prefix);

    if key.is_empty() {
        bail!("Invalid option: {}", arg);
    }

    if let Some((key, value)) = key.split_once('=') {
        if key.is_empty() {
            bail!("Invalid option: {}", arg);
        }
        parsed.options.insert(key.to_string(), value.to_string());
        return Ok(i + 1);
    }

    if flag_names.contains(&key) {
        parsed.flags.insert(key.to_string());
        return Ok(i + 1);
    }

    if i + 1 < args.len() && !args[i + 1].starts_with('-') {
        // Next argument is the value
        parsed.options.insert(key.to_string(), args[i + 1].clone());
        Ok(i + 2)
    } else {
        bail!("Option {} requires a value", arg);
    }
}

/// Parse arguments (without the program name). Names listed in
/// `flag_names` never take a value.
pub fn parse_args(args: &[String], flag_names: &[&str]) -> Result<ParsedArgs> {
    let mut parsed = ParsedArgs::default();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        // "--" ends option parsing; the rest is positional
        if arg == "--" {
            parsed.positional.extend(args[i + 1..].iter().cloned());
            break;
        }

        if arg.starts_with("--") {
            i = process_option("--", args, i, flag_names, &mut parsed)?;
        } else if arg.starts_with('-') && arg.len() > 1 {
            i = process_option("-", args, i, flag_names, &mut parsed)?;
        } else {
            // "-" included: stdin/stdout convention
            parsed.positional.push(arg.clone());
            i += 1;
        }
    }

    Ok(parsed)
}
