use anyhow::{Context, Result, anyhow};
use api_explorer::client::{ApiClient, Auth, DEFAULT_TIMEOUT_SECS};
use api_explorer::executor::ExecutionResult;
use api_explorer::form::{FormState, UPLOAD_FIELD, is_upload_operation};
use api_explorer::schema::Operation;
use api_explorer::storage::LocalStore;
use api_explorer::{Explorer, index, render, sources};
use clap::{Arg, ArgAction, Command};
use serde_json::Value;
use std::env;
use std::io::Write;
use std::path::PathBuf;

const DEFAULT_BASE_URL: &str = "http://localhost:3012";

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    setup_logging(matches.get_flag("debug"))?;
    let config = load_config(&matches)?;

    let api = ApiClient::new(config.base_url.clone(), config.timeout, config.auth.clone())?;
    let mut explorer = Explorer::open(api, LocalStore::new(&config.state_dir));

    let (name, sub) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("command required"))?;

    match name {
        "health" => handle_health(&explorer),
        "assets" => handle_assets(&mut explorer, sub),
        "history" => handle_history(&mut explorer, sub),
        "config" => handle_config(&explorer),
        _ => {
            if config.discover {
                if let Some(base) = explorer.discover_site_url() {
                    log::info!("base url is now {base}");
                }
            }
            match name {
                "list" => handle_list(&mut explorer, sub),
                "describe" => handle_describe(&mut explorer, sub),
                "call" => handle_call(&mut explorer, sub),
                "upload" => handle_upload(&mut explorer, sub),
                other => Err(anyhow!("unknown command {other}")),
            }
        }
    }
}

struct Config {
    base_url: String,
    timeout: Option<u64>,
    state_dir: PathBuf,
    auth: Option<Auth>,
    discover: bool,
}

fn load_config(matches: &clap::ArgMatches) -> Result<Config> {
    let base_url = matches
        .get_one::<String>("base_url")
        .cloned()
        .or_else(|| env::var("API_EXPLORER_BASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let timeout = match matches.get_one::<u64>("timeout").copied() {
        Some(seconds) => Some(seconds),
        None => env::var("API_EXPLORER_TIMEOUT")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("invalid API_EXPLORER_TIMEOUT")?,
    };

    let state_dir = matches
        .get_one::<String>("state_dir")
        .cloned()
        .or_else(|| env::var("API_EXPLORER_STATE_DIR").ok())
        .map(PathBuf::from)
        .unwrap_or_else(default_state_dir);

    let api_key = matches
        .get_one::<String>("api_key")
        .cloned()
        .or_else(|| env::var("API_EXPLORER_API_KEY").ok());

    let bearer = matches
        .get_one::<String>("bearer")
        .cloned()
        .or_else(|| env::var("API_EXPLORER_BEARER_TOKEN").ok());

    let auth = match (api_key, bearer) {
        (Some(_), Some(_)) => return Err(anyhow!("use either --api-key or --bearer, not both")),
        (Some(key), None) => Some(Auth::ApiKey(key)),
        (None, Some(token)) => Some(Auth::Bearer(token)),
        (None, None) => None,
    };

    Ok(Config {
        base_url,
        timeout,
        state_dir,
        auth,
        discover: !matches.get_flag("no_discover"),
    })
}

fn default_state_dir() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".api-explorer"),
        None => PathBuf::from(".api-explorer"),
    }
}

fn setup_logging(debug: bool) -> Result<()> {
    let rust_log = env::var("RUST_LOG").ok();
    log_builder(debug, rust_log.as_deref()).init();
    Ok(())
}

/// `RUST_LOG` directives apply when set, `warn` otherwise. `--debug`
/// raises everything to `debug`.
fn log_builder(debug: bool, rust_log: Option<&str>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(rust_log.unwrap_or("warn"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
}

fn build_cli() -> Command {
    let json_flag = || {
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Emit machine-readable JSON")
    };
    let limit_arg = |default: &'static str| {
        Arg::new("limit")
            .long("limit")
            .value_name("N")
            .value_parser(clap::value_parser!(usize))
            .default_value(default)
    };

    Command::new("api-explorer")
        .about("Browse and call an HTTP API described by its OpenAPI document")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("base_url")
                .long("base-url")
                .global(true)
                .value_name("URL")
                .help("API base URL (env: API_EXPLORER_BASE_URL)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .global(true)
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64))
                .help(format!(
                    "HTTP timeout in seconds, default {DEFAULT_TIMEOUT_SECS} (env: API_EXPLORER_TIMEOUT)"
                )),
        )
        .arg(
            Arg::new("state_dir")
                .long("state-dir")
                .global(true)
                .value_name("DIR")
                .help("Where recent assets and request history are kept (env: API_EXPLORER_STATE_DIR)"),
        )
        .arg(
            Arg::new("api_key")
                .long("api-key")
                .global(true)
                .value_name("KEY")
                .help("Send an X-API-Key header (env: API_EXPLORER_API_KEY)"),
        )
        .arg(
            Arg::new("bearer")
                .long("bearer")
                .global(true)
                .value_name("TOKEN")
                .help("Send a bearer token (env: API_EXPLORER_BEARER_TOKEN)"),
        )
        .arg(
            Arg::new("no_discover")
                .long("no-discover")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do not adopt the site_url advertised by the server"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(Command::new("health").about("Check whether the API answers"))
        .subcommand(Command::new("config").about("Show the server's runtime configuration"))
        .subcommand(
            Command::new("list")
                .about("List operations grouped by tag")
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .short('f')
                        .value_name("TEXT")
                        .help("Case-insensitive match on path, method, summary, description or tag"),
                )
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("describe")
                .about("Show the input form for an operation")
                .arg(
                    Arg::new("operation")
                        .required(true)
                        .value_name("OPERATION")
                        .help("\"METHOD /path\" or operationId"),
                )
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("call")
                .about("Fill an operation's form and send it")
                .arg(
                    Arg::new("operation")
                        .required(true)
                        .value_name("OPERATION")
                        .help("\"METHOD /path\" or operationId"),
                )
                .arg(
                    Arg::new("param")
                        .long("param")
                        .short('p')
                        .value_name("NAME=VALUE")
                        .action(ArgAction::Append)
                        .help("Path or query parameter"),
                )
                .arg(
                    Arg::new("asset")
                        .long("asset")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .help("Use the N-th recent upload (0 = newest) for asset_id"),
                )
                .arg(
                    Arg::new("field")
                        .long("field")
                        .value_name("NAME=VALUE")
                        .action(ArgAction::Append)
                        .help("Form field for multipart or url-encoded bodies"),
                )
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_name("NAME=SOURCE")
                        .action(ArgAction::Append)
                        .help("File field; SOURCE is a path, @path, file://, http(s):// or s3:// URL"),
                )
                .arg(
                    Arg::new("body")
                        .long("body")
                        .value_name("JSON|@FILE|URL|S3")
                        .help("JSON request body (replaces the pre-filled example)"),
                ),
        )
        .subcommand(
            Command::new("upload")
                .about("Upload a media file and remember the returned asset")
                .arg(
                    Arg::new("source")
                        .required(true)
                        .value_name("FILE|URL|S3"),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .value_name("FILENAME")
                        .help("File name to send instead of the source's own"),
                ),
        )
        .subcommand(
            Command::new("assets")
                .about("Show recently uploaded assets")
                .arg(limit_arg("20"))
                .arg(
                    Arg::new("clear")
                        .long("clear")
                        .action(ArgAction::SetTrue)
                        .help("Forget all recent assets"),
                )
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("history")
                .about("Show recently executed requests")
                .arg(limit_arg("50"))
                .arg(
                    Arg::new("clear")
                        .long("clear")
                        .action(ArgAction::SetTrue)
                        .help("Forget the request history"),
                )
                .arg(json_flag()),
        )
}

fn handle_health(explorer: &Explorer) -> Result<()> {
    let state = explorer.health();
    write_stdout_line(&format!("{} {}", state.as_str(), explorer.base_url()))
}

fn handle_config(explorer: &Explorer) -> Result<()> {
    let config = explorer
        .api()
        .get_json(api_explorer::explorer::CONFIG_PATH)?;
    write_json(&config)
}

fn handle_list(explorer: &mut Explorer, matches: &clap::ArgMatches) -> Result<()> {
    explorer.refresh()?;
    let query = matches
        .get_one::<String>("filter")
        .map(|v| v.as_str())
        .unwrap_or("");
    let found = index::filter(explorer.operations(), query);
    let groups = index::group_by_tag(&found);

    if matches.get_flag("json") {
        let mut out = Vec::new();
        for (tag, ops) in &groups {
            let ops: Vec<Value> = ops
                .iter()
                .map(|op| serde_json::json!({"id": op.id, "summary": op.summary}))
                .collect();
            out.push(serde_json::json!({"tag": tag, "operations": ops}));
        }
        return write_json(&Value::Array(out));
    }

    if groups.is_empty() {
        return write_stdout_line(&format!("no operations match '{query}'"));
    }
    for (tag, ops) in &groups {
        write_stdout_line(tag)?;
        for op in ops {
            write_stdout_line(&format!("  {}", render::render_operation_line(op)))?;
        }
    }
    Ok(())
}

fn handle_describe(explorer: &mut Explorer, matches: &clap::ArgMatches) -> Result<()> {
    explorer.refresh()?;
    let reference = matches
        .get_one::<String>("operation")
        .ok_or_else(|| anyhow!("operation required"))?;
    let (descriptor, state) = explorer.select(reference)?;

    if matches.get_flag("json") {
        return write_json(&serde_json::to_value(&descriptor)?);
    }
    let op = explorer.find(reference)?;
    if !op.summary.is_empty() {
        write_stdout_line(&op.summary)?;
    }
    if let Some(description) = &op.description {
        write_stdout_line(description)?;
    }
    write_stdout_line(
        render::render_form(&descriptor, state.asset_mode())
            .trim_end(),
    )
}

fn handle_call(explorer: &mut Explorer, matches: &clap::ArgMatches) -> Result<()> {
    explorer.refresh()?;
    let reference = matches
        .get_one::<String>("operation")
        .ok_or_else(|| anyhow!("operation required"))?;
    let op = explorer.find(reference)?.clone();
    let (_, mut state) = explorer.form_for(&op);

    if let Some(index) = matches.get_one::<usize>("asset") {
        let picked = state.pick_asset(*index)?;
        log::debug!("asset_id = {picked}");
    }
    for raw in matches.get_many::<String>("param").into_iter().flatten() {
        let (name, value) = split_assignment(raw, "--param")?;
        state.set_param(name, value)?;
    }
    for raw in matches.get_many::<String>("field").into_iter().flatten() {
        let (name, value) = split_assignment(raw, "--field")?;
        state.set_field(name, value)?;
    }
    for raw in matches.get_many::<String>("file").into_iter().flatten() {
        let (name, source) = if sources::looks_like_source(raw) || !raw.contains('=') {
            // A bare source is only unambiguous for the single-file upload.
            if !is_upload_operation(&op) {
                return Err(anyhow!("--file expects NAME=SOURCE, got '{raw}'"));
            }
            (UPLOAD_FIELD, raw.as_str())
        } else {
            split_assignment(raw, "--file")?
        };
        let file = sources::resolve_source(source)?;
        state.attach_file(name, file)?;
    }
    if let Some(raw) = matches.get_one::<String>("body") {
        state.set_body_text(&read_body_source(raw)?)?;
    }

    execute_and_print(explorer, &op, &state)
}

fn handle_upload(explorer: &mut Explorer, matches: &clap::ArgMatches) -> Result<()> {
    if let Err(err) = explorer.refresh() {
        log::warn!("{err}; using {}", api_explorer::explorer::DEFAULT_UPLOAD_PATH);
    }
    let source = matches
        .get_one::<String>("source")
        .ok_or_else(|| anyhow!("source required"))?;
    let mut file = sources::resolve_source(source)?;
    if let Some(name) = matches.get_one::<String>("name") {
        file = file.with_file_name(name.clone());
    }

    let op = explorer.upload_operation();
    let (_, mut state) = explorer.form_for(&op);
    state.attach_file(UPLOAD_FIELD, file)?;
    execute_and_print(explorer, &op, &state)
}

fn execute_and_print(explorer: &mut Explorer, op: &Operation, state: &FormState) -> Result<()> {
    let result: ExecutionResult = explorer.execute(op, state)?;
    write_stdout_line(&render::render_response(&result))?;
    if result.success {
        return Ok(());
    }
    if result.status == 0 {
        return Err(anyhow!("no response from {}", explorer.base_url()));
    }
    Err(anyhow!("request failed with http {}", result.status))
}

fn handle_assets(explorer: &mut Explorer, matches: &clap::ArgMatches) -> Result<()> {
    if matches.get_flag("clear") {
        explorer.registry_mut().clear();
        return write_stdout_line("cleared recent assets");
    }
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(20);
    let assets = explorer.registry().recent(limit);
    if matches.get_flag("json") {
        return write_json(&serde_json::to_value(assets)?);
    }
    if assets.is_empty() {
        return write_stdout_line("no recent uploads");
    }
    for (i, asset) in assets.iter().enumerate() {
        write_stdout_line(&format!("[{i}] {}", render::render_asset(asset)))?;
    }
    Ok(())
}

fn handle_history(explorer: &mut Explorer, matches: &clap::ArgMatches) -> Result<()> {
    if matches.get_flag("clear") {
        explorer.history_mut().clear();
        return write_stdout_line("cleared request history");
    }
    let limit = matches.get_one::<usize>("limit").copied().unwrap_or(50);
    let entries = explorer.history().recent(limit);
    if matches.get_flag("json") {
        return write_json(&serde_json::to_value(entries)?);
    }
    if entries.is_empty() {
        return write_stdout_line("no requests yet");
    }
    for entry in entries {
        write_stdout_line(&render::render_history_entry(entry))?;
    }
    Ok(())
}

fn split_assignment<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("{flag} expects NAME=VALUE, got '{raw}'"))
}

fn read_body_source(raw: &str) -> Result<String> {
    if sources::looks_like_source(raw) {
        return sources::read_source_to_string(raw);
    }
    Ok(raw.to_string())
}

fn write_json(value: &Value) -> Result<()> {
    write_stdout_line(&serde_json::to_string_pretty(value)?)
}

fn write_stdout_line(value: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if let Err(err) = out.write_all(value.as_bytes()) {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    if let Err(err) = out.write_all(b"\n") {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    Ok(())
}
