//! Build script for cotick-runtime
//!
//! Handles configuration merging:
//! 1. Start with library defaults
//! 2. If COT_CONFIG_RS env var is set, parse the user's config file
//! 3. Merge user values over defaults (user wins)
//! 4. Generate OUT_DIR/cot_merged_config.rs
//!
//! The user file only lists the values it changes, one per line:
//!
//! ```text
//! pub const TICK_INTERVAL_MS: u64 = 250;
//! pub const STACK_SIZE: usize = 512 * 1024;
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

struct ConfigParam {
    name: &'static str,
    rust_type: &'static str,
    default_value: &'static str,
}

const CONFIG_PARAMS: &[ConfigParam] = &[
    ConfigParam {
        name: "TICK_INTERVAL_MS",
        rust_type: "u64",
        default_value: "1000",
    },
    ConfigParam {
        name: "STACK_SIZE",
        rust_type: "usize",
        default_value: "256 * 1024",
    },
    ConfigParam {
        name: "MAX_EXCEPTION_DEPTH",
        rust_type: "u32",
        default_value: "8",
    },
    ConfigParam {
        name: "DEBUG_LOGGING",
        rust_type: "bool",
        default_value: "false",
    },
];

fn main() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR not set");
    let dest_path = Path::new(&out_dir).join("cot_merged_config.rs");

    let mut config: HashMap<&'static str, String> = CONFIG_PARAMS
        .iter()
        .map(|p| (p.name, p.default_value.to_string()))
        .collect();

    let user_path = env::var("COT_CONFIG_RS").ok();
    if let Some(path) = &user_path {
        println!("cargo:rerun-if-changed={}", path);

        match fs::read_to_string(path) {
            Ok(content) => {
                for unknown in parse_and_merge(&content, &mut config) {
                    println!("cargo:warning=Unknown config parameter: {}", unknown);
                }
                println!("cargo:warning=Using custom config: {}", path);
            }
            Err(e) => {
                println!("cargo:warning=Failed to read COT_CONFIG_RS ({}): {}", path, e);
            }
        }
    }

    println!("cargo:rerun-if-env-changed=COT_CONFIG_RS");
    println!("cargo:rerun-if-changed=build.rs");

    let output = generate_config(&config, user_path.is_some());
    fs::write(&dest_path, output).expect("Failed to write merged config");
}

/// Merge `pub const NAME: TYPE = VALUE;` lines into `config`.
/// Returns the names that are not known parameters.
fn parse_and_merge(content: &str, config: &mut HashMap<&'static str, String>) -> Vec<String> {
    let mut unknown = Vec::new();

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("//") || !line.starts_with("pub const ") {
            continue;
        }

        let Some((name, value)) = parse_const_line(line) else {
            continue;
        };

        match CONFIG_PARAMS.iter().find(|p| p.name == name) {
            Some(param) => {
                config.insert(param.name, value);
            }
            None => unknown.push(name),
        }
    }

    unknown
}

/// Split `pub const NAME: TYPE = VALUE;` into `(NAME, VALUE)`
fn parse_const_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix("pub const ")?.trim();

    let colon_pos = rest.find(':')?;
    let name = rest[..colon_pos].trim().to_string();

    let eq_pos = rest.find('=')?;
    let semi_pos = rest.rfind(';').unwrap_or(rest.len());
    if semi_pos <= eq_pos {
        return None;
    }
    let value = rest[eq_pos + 1..semi_pos].trim().to_string();

    Some((name, value))
}

fn generate_config(config: &HashMap<&'static str, String>, custom: bool) -> String {
    let mut output = String::new();

    output.push_str("// Auto-generated by build.rs - do not edit\n");
    output.push_str("// Configuration merged from library defaults");
    if custom {
        output.push_str(" and the file named by COT_CONFIG_RS");
    }
    output.push_str("\n\n");

    for param in CONFIG_PARAMS {
        let value = config
            .get(param.name)
            .map(String::as_str)
            .unwrap_or(param.default_value);
        output.push_str(&format!(
            "pub const {}: {} = {};\n",
            param.name, param.rust_type, value
        ));
    }

    output
}
