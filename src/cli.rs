use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(
    author,
    version,
    about = "Blind NoSQL injection scanner and adaptive data extraction engine",
    long_about = None,
    after_help = "EXAMPLES:
  Blind boolean/time-based dump:
    tomcat -u http://target/login -d '{\"username\":\"admin\",\"password\":\"x\"}' -p password -t 8

  From a captured raw request, WAF evasion tampers:
    tomcat -r login.txt --tamper unicode_keys,space_to_newline --random-agent

  List collections once injection is confirmed:
    tomcat -u http://target/api/search -d '{\"q\":\"x\"}' --collections

For more information: see the project README."
)]
pub struct Cli {
    /// Path to a raw HTTP request file (mutually exclusive with -u)
    #[arg(short = 'r', long, value_name = "FILE", conflicts_with = "url")]
    pub request: Option<String>,

    /// Target URL (mutually exclusive with -r)
    #[arg(short = 'u', long, value_name = "URL")]
    pub url: Option<String>,

    /// Request body: JSON object, or key=value&key=value form data
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// HTTP method to use with -u [default: POST]
    #[arg(short = 'm', long, default_value = "POST")]
    pub method: String,

    /// Worker thread count for the character extractor
    #[arg(short = 't', long, default_value_t = 1)]
    pub threads: usize,

    /// Rotate a random User-Agent from user-agents.txt on every request
    #[arg(long)]
    pub random_agent: bool,

    /// Proxy URL (http://, https:// or socks5://)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Route traffic through a local Tor SOCKS5 proxy (127.0.0.1:9050)
    #[arg(long)]
    pub tor: bool,

    /// Fixed delay (seconds) applied before every request
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10.0)]
    pub timeout: f64,

    /// Retries on 429/5xx before giving up on a request
    #[arg(long, default_value_t = 3)]
    pub retries: u8,

    /// Override the calibrated sleep duration for time-based detection (seconds)
    #[arg(long)]
    pub time_sec: Option<f64>,

    /// Re-authentication endpoint hit transparently on 401/403
    #[arg(long)]
    pub auth_url: Option<String>,

    /// Body sent to --auth-url (JSON object, or raw text)
    #[arg(long)]
    pub auth_data: Option<String>,

    /// Browser fingerprint to impersonate: chrome120, safari15_3, firefox117
    #[arg(long, default_value = "chrome120")]
    pub impersonate: String,

    /// Comma-separated tamper stage names, applied in priority order
    #[arg(long, value_delimiter = ',')]
    pub tamper: Vec<String>,

    /// List available tamper stages and exit
    #[arg(long)]
    pub list_tampers: bool,

    /// JavaScript expression prefix injected before every `$where` payload
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// JavaScript expression suffix injected after every `$where` payload
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Restrict the scan to a single request parameter
    #[arg(short = 'p', long)]
    pub param: Option<String>,

    /// Detection techniques to try, any combination of A(uth bypass)/B(oolean blind)/J(S injection)
    #[arg(long, default_value = "ABJ")]
    pub technique: String,

    /// Enumerate database names via a canned expression
    #[arg(long)]
    pub dbs: bool,

    /// Enumerate collection names via a canned expression
    #[arg(long)]
    pub collections: bool,

    /// Enumerate the authenticated user via a canned expression
    #[arg(long)]
    pub users: bool,

    /// Run the full blind-extraction dump against the confirmed parameter
    #[arg(long)]
    pub dump: bool,

    /// Read a file off the database server via a JS injection primitive
    #[arg(long, value_name = "PATH")]
    pub file_read: Option<String>,

    /// Run a shell command on the database server via a JS injection primitive
    #[arg(long, value_name = "COMMAND")]
    pub os_cmd: Option<String>,

    /// Database name, used by --collections/--dump against a selected db
    #[arg(short = 'D', long)]
    pub db: Option<String>,

    /// Table/collection name, used by --dump against a selected collection
    #[arg(short = 'T', long)]
    pub table: Option<String>,

    /// Column/field name, used by --dump against a selected field
    #[arg(short = 'C', long)]
    pub column: Option<String>,

    /// Enable detailed debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Mirrors the reference tool's own `main()` mutual-exclusivity checks,
/// run once after clap's own parsing succeeds.
pub fn validate(cli: &Cli) -> anyhow::Result<()> {
    if cli.request.is_none() && cli.url.is_none() {
        anyhow::bail!("one of -r/--request or -u/--url is required");
    }
    if cli.url.is_some() && cli.data.is_none() && !cli.list_tampers {
        anyhow::bail!("-u/--url requires -d/--data");
    }
    if cli.file_read.is_some() && cli.os_cmd.is_some() {
        anyhow::bail!("--file-read and --os-cmd are mutually exclusive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_target() {
        let cli = Cli::parse_from(["tomcat", "-u", "http://x"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn validate_accepts_request_file_alone() {
        let cli = Cli::parse_from(["tomcat", "-r", "req.txt"]);
        assert!(validate(&cli).is_ok());
    }
}
