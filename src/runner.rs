//! Top-level dispatch: turns parsed CLI flags into a `RequestTemplate`
//! and `ClientConfig`, builds the `Engine`, and routes to whichever
//! technique(s)/enumeration/post-exploitation wrapper the flags ask for.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{self, Cli};
use crate::config::Config;
use crate::enumerate::{self, EnumerationTarget};
use crate::http_client::{AuthData, BrowserProfile};
use crate::orchestrator::{self, RunOptions};
use crate::payloads::PayloadCatalog;
use crate::request::{Method, RequestTemplate};
use crate::tamper::{available_stage_names, TamperPipeline};
use crate::value::Value;
use crate::{auth_bypass, fingerprint, js_injection, postexploit, user_agents};

pub fn run_from_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.debug, cli.verbose);

    if cli.list_tampers {
        for name in available_stage_names() {
            println!("{name}");
        }
        return Ok(());
    }

    cli::validate(&cli)?;

    let config = Config::default();
    let template = build_template(&cli)?;
    let client_cfg = build_client_config(&cli, &config)?;

    let opts = RunOptions {
        threads: cli.threads.max(1),
        only_param: cli.param.clone(),
        time_sec: cli.time_sec,
        session_dir: config.session_dir.clone(),
    };

    let engine = orchestrator::build_engine(client_cfg, template, &opts, cli.prefix.clone(), cli.suffix.clone())?;

    if let Some(path) = &cli.file_read {
        match postexploit::read_file(&engine, path)? {
            Some(contents) => println!("{contents}"),
            None => println!("could not read file; target does not expose a usable JS injection primitive"),
        }
        return Ok(());
    }
    if let Some(command) = &cli.os_cmd {
        match postexploit::run_os_command(&engine, command)? {
            Some(output) => println!("{output}"),
            None => println!("command execution failed; target does not expose a usable JS injection primitive"),
        }
        return Ok(());
    }

    let backend = fingerprint::fingerprint(&engine, cli.time_sec);
    println!("Backend fingerprint: {}", backend.label());

    let catalog_path = config.payload_catalog_path.clone();
    let catalog = PayloadCatalog::load(&catalog_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load payload catalog, enumeration/auth-bypass/js-injection disabled");
        PayloadCatalog {
            auth_bypass: vec![],
            js_injection: vec![],
            enumeration_templates: crate::payloads::EnumerationTemplates {
                mongodb: Default::default(),
                generic: Default::default(),
            },
        }
    });

    if cli.dbs {
        report_expression("database name", enumerate::run(&engine, &backend, &catalog.enumeration_templates, EnumerationTarget::CurrentDb)?);
    }
    if cli.collections {
        report_expression(
            "collections",
            enumerate::run(&engine, &backend, &catalog.enumeration_templates, EnumerationTarget::ListCollections)?,
        );
    }
    if cli.users {
        report_expression(
            "authenticated user",
            enumerate::run(&engine, &backend, &catalog.enumeration_templates, EnumerationTarget::CurrentUser)?,
        );
    }

    let technique = cli.technique.to_ascii_uppercase();
    if technique.contains('A') {
        let hits = auth_bypass::run(&engine, &catalog)?;
        for hit in &hits {
            println!("auth bypass candidate: param={} payload_index={}", hit.param, hit.payload_index);
        }
    }
    if technique.contains('J') {
        let hits = js_injection::run(&engine, &catalog, &cli.prefix, &cli.suffix, cli.time_sec)?;
        for hit in &hits {
            println!("js injection candidate: param={} template={} time_based={}", hit.param, hit.template_index, hit.time_based);
        }
    }
    if technique.contains('B') || cli.dump {
        let report = orchestrator::run_blind_dump(&engine, &opts)?;
        for extracted in &report.extracted {
            println!("{} [{}] = {}", extracted.param, extracted.strategy, extracted.value);
        }
    }

    Ok(())
}

fn report_expression(label: &str, value: Option<String>) {
    match value {
        Some(v) => println!("{label}: {v}"),
        None => println!("{label}: could not extract (no injectable parameter confirmed)"),
    }
}

fn build_template(cli: &Cli) -> anyhow::Result<RequestTemplate> {
    if let Some(path) = &cli.request {
        return crate::request::parse_raw_request_file(&PathBuf::from(path));
    }
    let url = cli.url.as_deref().expect("validated by cli::validate");
    let method = Method::parse(&cli.method)?;
    RequestTemplate::from_url_and_data(url, method, cli.data.as_deref())
}

fn build_client_config(cli: &Cli, config: &Config) -> anyhow::Result<std::sync::Arc<crate::http_client::ClientConfig>> {
    let impersonate = BrowserProfile::parse(&cli.impersonate);
    let user_agent_override = if cli.random_agent {
        let agents = user_agents::load(&config.user_agents_path).unwrap_or_default();
        user_agents::pick_random(&agents)
    } else {
        None
    };
    let auth_data = match &cli.auth_data {
        None => None,
        Some(raw) => Some(match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => AuthData::Json(Value::from_json(json)),
            Err(_) => AuthData::Raw(raw.clone()),
        }),
    };
    let tamper = TamperPipeline::build(&cli.tamper);
    Ok(orchestrator::make_client_config(
        indexmap::IndexMap::new(),
        Duration::from_secs_f64(cli.timeout),
        cli.retries,
        cli.delay,
        cli.auth_url.clone(),
        auth_data,
        impersonate,
        user_agent_override,
        cli.proxy.clone(),
        cli.tor,
        tamper,
    ))
}

fn init_logging(debug: bool, verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let crate_level = if debug { "debug" } else if verbose { "info" } else { "warn" };
    let filter_str = format!("nosql_tomcat={crate_level},reqwest=warn,hyper=warn");
    let env_filter = EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).with_ansi(true).with_target(false).try_init();
}
