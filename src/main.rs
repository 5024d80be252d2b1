// SPDX-License-Identifier: MIT

//! CadScope CLI entrypoint.
//!
//! By default this serves MCP over stdio against the snapshot database in the
//! current directory. Use `--mcp-http-port` to serve MCP over streamable HTTP
//! at `http://127.0.0.1:<port>/mcp` instead.
//!
//! The bundled drawing host is the scripted in-memory host (`--demo` seeds a
//! sample drawing, `--fixture` loads drawings from JSON). A real CAD
//! application attaches by embedding the crate and implementing
//! `cadscope::host::DrawingHost`.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cadscope::host::{DrawingHost, ScriptedHost};
use cadscope::mcp::CadScopeMcp;
use cadscope::model::DrawingId;
use cadscope::store::SnapshotStore;

const DEFAULT_DB_FILE: &str = "cadscope.db";
const DEMO_DRAWING_ID: &str = "demo.dwg";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [<db-path>] [--demo | --fixture <file.json>] [--scan-cap <n>] [--verbose]\n  {program} [--db <path>] [--demo | --fixture <file.json>] [--mcp-http-port <port>] [--scan-cap <n>] [--verbose]\n\nServes MCP over stdio by default; --mcp-http-port serves streamable HTTP at\n`http://127.0.0.1:<port>/mcp` instead.\n\nIf db-path/--db is omitted, `{DEFAULT_DB_FILE}` in the current directory is used.\n--demo seeds a built-in sample drawing; --fixture loads drawings from a JSON\nfile. Without either, the scripted host starts with no open drawings.\n--scan-cap bounds how many entities one scan may ingest (default 100000)."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    db_path: Option<String>,
    demo: bool,
    fixture: Option<String>,
    mcp_http_port: Option<u16>,
    scan_cap: Option<usize>,
    verbose: bool,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--demo" => {
                if options.demo {
                    return Err(());
                }
                options.demo = true;
            }
            "--db" => {
                if options.db_path.is_some() {
                    return Err(());
                }
                let path = args.next().ok_or(())?;
                options.db_path = Some(path);
            }
            "--fixture" => {
                if options.fixture.is_some() {
                    return Err(());
                }
                let path = args.next().ok_or(())?;
                options.fixture = Some(path);
            }
            "--mcp-http-port" => {
                if options.mcp_http_port.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let port: u16 = raw.parse().map_err(|_| ())?;
                options.mcp_http_port = Some(port);
            }
            "--scan-cap" => {
                if options.scan_cap.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let cap: usize = raw.parse().map_err(|_| ())?;
                if cap == 0 {
                    return Err(());
                }
                options.scan_cap = Some(cap);
            }
            "--verbose" => {
                if options.verbose {
                    return Err(());
                }
                options.verbose = true;
            }
            _ if arg.starts_with('-') => return Err(()),
            _ => {
                if options.db_path.is_some() {
                    return Err(());
                }
                options.db_path = Some(arg);
            }
        }
    }

    if options.demo && options.fixture.is_some() {
        return Err(());
    }

    Ok(options)
}

fn build_host(options: &CliOptions) -> Result<Arc<dyn DrawingHost>, Box<dyn Error>> {
    if options.demo {
        let drawing_id = DrawingId::new(DEMO_DRAWING_ID)?;
        info!("demo host ready with drawing {drawing_id}");
        return Ok(Arc::new(ScriptedHost::demo(&drawing_id)));
    }
    if let Some(fixture) = &options.fixture {
        let host = ScriptedHost::from_fixture(&PathBuf::from(fixture))?;
        info!("fixture host loaded from {fixture}");
        return Ok(Arc::new(host));
    }
    Ok(Arc::new(ScriptedHost::new()))
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "cadscope".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        // Stdout belongs to the MCP stdio transport; logs go to stderr.
        let log_level = if options.verbose { Level::DEBUG } else { Level::INFO };
        FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();

        let db_path = options.db_path.clone().unwrap_or_else(|| DEFAULT_DB_FILE.to_owned());
        let store = SnapshotStore::open(&PathBuf::from(&db_path))?;
        let host = build_host(&options)?;

        let mut mcp = CadScopeMcp::new(host, store);
        if let Some(cap) = options.scan_cap {
            mcp = mcp.with_scan_cap(cap);
        }

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        if let Some(port) = options.mcp_http_port {
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
                info!("serving MCP over HTTP at http://{}/mcp", listener.local_addr()?);

                let config = StreamableHttpServerConfig {
                    stateful_mode: true,
                    ..StreamableHttpServerConfig::default()
                };
                let session_manager = Arc::new(LocalSessionManager::default());
                let mcp_service = StreamableHttpService::new(
                    move || Ok(mcp.clone()),
                    session_manager,
                    config,
                );

                let router = Router::new().nest_service("/mcp", mcp_service);
                axum::serve(listener, router).await?;
                Ok::<(), Box<dyn Error>>(())
            })?;
            return Ok(());
        }

        runtime.block_on(mcp.serve_stdio())?;
        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("cadscope: {err}");
        std::process::exit(1);
    }
}
