//! UI utilities for the terminal client.

use std::io::Write;

/// Redisplay the prompt after printing an update
pub fn redisplay_prompt(surveyor_name: &str) {
    print!("{}> ", surveyor_name);
    std::io::stdout().flush().ok();
}
