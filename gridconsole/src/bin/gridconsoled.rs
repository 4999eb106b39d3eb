// Copyright (C) 2025 gridconsole developers
//
// This file is part of gridconsole.
//
// gridconsole is free software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gridconsole is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gridconsole.  If
// not, see <http://www.gnu.org/licenses/>.

//! # gridconsoled
//!
//! The gridconsole daemon: a web-based configuration console for distributed cache clusters.
//! Serves the `/rest` API on a world-facing address and health & metrics endpoints on a local
//! one.

use std::{
    env,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{extract::State, routing::get, Router};
use chrono::Duration;
use clap::{crate_version, value_parser, Arg, ArgAction, Command};
use http::{HeaderName, HeaderValue};
use opentelemetry::{global, KeyValue};
use serde::Deserialize;
use snafu::{prelude::*, IntoError};
use tap::Pipe;
use tokio::{
    net::TcpListener,
    signal::unix::{signal, SignalKind},
    sync::Notify,
};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, Layer, Registry};

use gridconsole::{
    http::{make_rest_router, Gridconsole},
    memory,
    metrics::{check_metric_registrations, Instruments},
    peppers::Peppers,
    scylla,
    storage::Backend as StorageBackend,
    util::Credentials,
};

/// The gridconsole application error type
///
/// Note that [Debug] is implemented by hand, in terms of [Display]: `main()` returns
/// `Result<(), Error>`, and on the `Err` variant the Rust runtime prints the `Debug`
/// representation to stderr. The derived implementation is not very readable.
#[derive(Snafu)]
pub enum Error {
    #[snafu(display("Failed to bind a listening socket: {source}"))]
    Bind { source: std::io::Error },
    #[snafu(display("Unable to read configuration file: {source}"))]
    ConfigNotFound {
        pth: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Error parsing configuration file: {source}"))]
    ConfigParse {
        pth: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Failed to parse RUST_LOG: {source}"))]
    EnvFilter {
        source: tracing_subscriber::filter::FromEnvError,
    },
    #[snafu(display("While building the Prometheus exporter, {message}"))]
    PrometheusExporter { message: String },
    #[snafu(display("Failed to connect to ScyllaDB: {source}"))]
    Scylla {
        #[snafu(source(from(gridconsole::scylla::Error, Box::new)))]
        source: Box<gridconsole::scylla::Error>,
    },
    #[snafu(display("Failed to set the tracing subscriber: {source}"))]
    Subscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
    #[snafu(display("Failed to instantiate a Tokio runtime: {source}"))]
    TokioRuntime { source: std::io::Error },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self, f)
    }
}

type Result<T> = std::result::Result<T, Error>;

type StdResult<T, E> = std::result::Result<T, E>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          configuration                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Logging-related options read from the command line or the environment
struct LogOpts {
    pub plain: bool,
    pub level: Level,
}

impl LogOpts {
    fn new(matches: &clap::ArgMatches) -> LogOpts {
        LogOpts {
            plain: matches.get_flag("plain"),
            level: match (
                matches.get_flag("debug"),
                matches.get_flag("verbose"),
                matches.get_flag("quiet"),
            ) {
                (true, _, _) => Level::TRACE,
                (false, true, _) => Level::DEBUG,
                (false, false, true) => Level::ERROR,
                (_, _, _) => Level::INFO,
            },
        }
    }
}

/// Configuration options read from the CLI (or the environment)
struct CliOpts {
    pub log_opts: LogOpts,
    pub cfg: Option<PathBuf>,
    /// World-facing listen address, overriding whatever configuration says
    pub address: Option<SocketAddr>,
}

impl CliOpts {
    fn new(matches: clap::ArgMatches) -> Result<CliOpts> {
        let here = env::current_dir().ok();
        Ok(CliOpts {
            log_opts: LogOpts::new(&matches),
            cfg: matches
                .get_one::<PathBuf>("config")
                .cloned()
                .map(|p| here.map_or_else(|| p.clone(), |h| h.join(&p))),
            address: matches.get_one::<SocketAddr>("address").copied(),
        })
    }
}

/// Parse the configuration file & apply any command-line overrides
fn effective_config(opts: &CliOpts) -> Result<ConfigV1> {
    let mut cfg = parse_config(&opts.cfg)?;
    if let Some(address) = opts.address {
        cfg.address = address;
    }
    Ok(cfg)
}

/// gridconsole datastore configuration
///
/// Most of the program writes to the generic [StorageBackend] API; at startup a particular
/// implementation is chosen, according to this configuration.
// Nb that we can only deserialize (i.e. not serialize) due to the presence of secrets in the
// struct
#[derive(Clone, Debug, Deserialize)]
pub enum StorageConfig {
    /// In-process storage; documents do not survive a restart. For development & test.
    Memory,
    /// Use ScyllaDB/CQL interface
    Scylla {
        /// ScyllaDB credentials, if authentication is to be used
        credentials: Option<Credentials>,
        /// ScyllaDB hosts; specify as "host:port" (or anything that can be parsed as a [SocketAddr])
        hosts: Vec<SocketAddr>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Scylla {
            credentials: None,
            hosts: vec!["127.0.0.1:9042".parse::<SocketAddr>().unwrap(/* known good */)],
        }
    }
}

/// gridconsole configuration, version one
#[derive(Clone, Debug, Deserialize)]
struct ConfigV1 {
    /// Local address at which to listen for API requests; specify as "address:port"
    address: SocketAddr,
    /// Address at which to serve `/healthz` & `/metrics`; specify as "address:port"
    #[serde(rename = "local-address")]
    local_address: SocketAddr,
    #[serde(rename = "storage-config")]
    storage_config: StorageConfig,
    peppers: Peppers,
    /// Lifetime of each login session, in seconds, measured from the moment of login
    #[serde(rename = "session-lifetime-seconds")]
    session_lifetime_seconds: i64,
}

impl Default for ConfigV1 {
    fn default() -> Self {
        ConfigV1 {
            address: "0.0.0.0:3000".parse::<SocketAddr>().unwrap(/* known good */),
            local_address: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(/* known good */),
            storage_config: StorageConfig::default(),
            peppers: Peppers::default(),
            session_lifetime_seconds: 86400,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "version")] // tag "internally"
enum Configuration {
    #[serde(rename = "1")]
    V1(ConfigV1),
}

/// Parse the gridconsole configuration file
fn parse_config(cfg: &Option<PathBuf>) -> Result<ConfigV1> {
    let (pth, defaulted): (PathBuf, bool) = cfg.as_ref().map_or_else(
        || (PathBuf::from_str("/etc/gridconsole.toml").unwrap(), true),
        |p| (p.clone(), false),
    );
    match std::fs::read_to_string(&pth) {
        Ok(text) => match toml::from_str::<Configuration>(&text) {
            Ok(cfg) => match cfg {
                Configuration::V1(cfg) => Ok(cfg),
            },
            Err(err) => Err(ConfigParseSnafu { pth }.into_error(err)),
        },
        Err(err) => {
            if defaulted {
                Ok(ConfigV1::default())
            } else {
                Err(ConfigNotFoundSnafu { pth }.into_error(err))
            }
        }
    }
}

/// Configure gridconsole logging
///
/// We always run in the foreground (the usual case being inside a container), so logs go to
/// stdout; structured/JSON unless asked for human-readable output.
///
/// This method can only be invoked once (as it, in turn, calls tracing's
/// [set_global_default](tracing::subscriber::set_global_default)).
fn configure_logging(logopts: &LogOpts) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(logopts.level.into())
        .from_env()
        .context(EnvFilterSnafu)?;

    // `json()` & `compact()` produce layers *of different types*; it is for this reason that
    // `Box<dyn Layer<S> + Send + Sync>` implements `Layer`.
    let formatter: Box<dyn Layer<Registry> + Send + Sync> = if logopts.plain {
        Box::new(fmt::Layer::default().compact().with_writer(std::io::stdout))
    } else {
        Box::new(
            fmt::Layer::default()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stdout),
        )
    };

    tracing::subscriber::set_global_default(Registry::default().with(formatter).with(filter))
        .context(SubscriberSnafu)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           the server                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn otel_middleware(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    // OTel names must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'.
    // Here, I remove any illegal characters & replace '/' with '.'.
    let stem: String = request
        .uri()
        .path()
        .as_bytes()
        .iter()
        .filter_map(|x| {
            if 47 == *x {
                Some('.')
            } else if (44 < *x && *x < 58) || (64 < *x && *x < 91) || (96 < *x && *x < 123) {
                Some(char::from_u32(*x as u32).unwrap(/* known good */))
            } else {
                None
            }
        })
        .collect();

    let name = format!("http.{}{}", request.method().as_str().to_lowercase(), stem);
    let counter = global::meter("gridconsole").u64_counter(name).build();
    counter.add(1, &[]);
    next.run(request).await
}

async fn healthcheck() -> &'static str {
    "GOOD"
}

async fn metrics(State(state): State<Arc<Gridconsole>>) -> String {
    use prometheus::Encoder;
    let mut output = Vec::new();
    prometheus::TextEncoder::new()
        .encode(&state.registry.gather(), &mut output)
        .expect("Failed to encode Prom metrics");
    String::from_utf8(output).expect("Non UTF-8 Prom exporter response?")
}

/// Counter for generating request IDs; a u64 gives a lot less information than a UUID (the
/// traditional type for request IDs), but it's enough, more easily readable, and a useful gauge
/// of how long the server's been up.
#[derive(Clone, Debug, Default)]
struct RequestIdGenerator {
    counter: Arc<AtomicU64>,
}

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &axum::extract::Request<B>) -> Option<RequestId> {
        self.counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .pipe(|s| RequestId::new(HeaderValue::from_str(&s).unwrap(/* known good */)))
            .pipe(Some)
    }
}

/// Make the [Router] that will be accessible to the world
fn make_world_router(state: Arc<Gridconsole>) -> Router {
    make_rest_router(state)
        // Incoming requests should hit the `SetRequestIdLayer` *first*, so it's the last/outer
        // layer applied.
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(axum::middleware::from_fn(otel_middleware))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            RequestIdGenerator::default(),
        ))
}

/// Make the [Router] that will only be locally accessible
fn make_local_router(state: Arc<Gridconsole>) -> Router {
    Router::new()
        .route("/healthz", get(healthcheck))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn select_storage(config: &StorageConfig) -> Result<Arc<dyn StorageBackend + Send + Sync>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(memory::Store::new())),
        StorageConfig::Scylla { credentials, hosts } => Ok(Arc::new(
            scylla::Session::new(hosts.iter().map(|h| h.to_string()), credentials)
                .await
                .context(ScyllaSnafu)?,
        )),
    }
}

/// Initialize telemetry
///
/// Must be invoked from inside the Tokio runtime, but before any instruments are accessed.
/// Returns the [prometheus::Registry] backing the `/metrics` endpoint.
fn init_telemetry() -> Result<prometheus::Registry> {
    check_metric_registrations();
    let registry = prometheus::Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()
        .map_err(|err| {
            PrometheusExporterSnafu {
                message: err.to_string(),
            }
            .build()
        })?;

    let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
        .with_resource(
            opentelemetry_sdk::Resource::builder_empty()
                .with_attribute(KeyValue::new("service.name", "gridconsole"))
                .build(),
        )
        .with_reader(exporter)
        .build();
    global::set_meter_provider(provider);

    Ok(registry)
}

/// Serve `gridconsole` API requests
async fn serve(opts: CliOpts, mut cfg: ConfigV1) -> Result<()> {
    // Produce a future which can be used to signal graceful shutdown, below.
    async fn shutdown_signal(nfy: Arc<Notify>) {
        nfy.notified().await
    }

    let mut sighup = signal(SignalKind::hangup()).unwrap();
    let mut sigterm = signal(SignalKind::terminate()).unwrap();

    let registry = init_telemetry()?;

    // Loop forever, handling SIGHUPs, until asked to terminate:
    loop {
        // Re-build our database connection each pass, in case configuration values have changed
        // (this is also how the operator rotates peppers without downtime):
        let storage = select_storage(&cfg.storage_config).await?;

        let state = Arc::new(Gridconsole::new(
            storage,
            registry.clone(),
            Instruments::new("gridconsole"),
            cfg.peppers.clone(),
            Duration::seconds(cfg.session_lifetime_seconds),
        ));

        let world_nfy = Arc::new(Notify::new());
        let local_nfy = Arc::new(Notify::new());

        let world_server = axum::serve(
            TcpListener::bind(&cfg.address).await.context(BindSnafu)?,
            make_world_router(state.clone()),
        )
        .with_graceful_shutdown(shutdown_signal(world_nfy.clone()));

        let local_server = axum::serve(
            TcpListener::bind(&cfg.local_address)
                .await
                .context(BindSnafu)?,
            make_local_router(state.clone()),
        )
        .with_graceful_shutdown(shutdown_signal(local_nfy.clone()));

        use std::future::IntoFuture;
        let mut world_server = world_server.into_future();
        let mut local_server = local_server.into_future();

        fn log_on_err<T, E>(x: StdResult<T, E>)
        where
            E: std::error::Error + std::fmt::Debug,
        {
            if let Err(err) = x {
                error!("{:?}", err);
            }
        }

        tokio::select! {
            // Intentionally not handling these-- the servers *should* never shutdown on their
            // own. That said, if I don't move `world_server` into a Future, it never gets polled.
            _ = &mut world_server => unimplemented!(),
            _ = &mut local_server => unimplemented!(),
            _ = sighup.recv() => {
                info!("Received SIGHUP; closing DB connections to re-read configuration.");
                world_nfy.notify_one();
                local_nfy.notify_one();
                log_on_err(world_server.await);
                log_on_err(local_server.await);
                // Fall back to the last known-good configuration on a parse failure & keep going:
                cfg = match effective_config(&opts) {
                    Ok(new_cfg) => new_cfg,
                    Err(err) => {
                        error!("Failed to re-read configuration ({}); keeping the old.", err);
                        cfg
                    }
                };
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM; terminating.");
                world_nfy.notify_one();
                local_nfy.notify_one();
                log_on_err(world_server.await);
                log_on_err(local_server.await);
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c; terminating.");
                world_nfy.notify_one();
                local_nfy.notify_one();
                log_on_err(world_server.await);
                log_on_err(local_server.await);
                break;
            }
        }; // End tokio::select!.
    } // End loop.

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                    main() & process startup                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

async fn go_async(opts: CliOpts) -> Result<()> {
    let cfg = effective_config(&opts)?;
    configure_logging(&opts.log_opts)?;

    info!("gridconsole version {} starting.", crate_version!());

    serve(opts, cfg).await
}

fn main() -> Result<()> {
    // Most of gridconsoled's configuration is read from file; the few command-line options that it
    // accepts govern where to find the configuration file & logging. They all have corresponding
    // environment variables for the sake of convenience when running in a container.
    let opts = CliOpts::new(
        Command::new("gridconsoled")
            .version(crate_version!())
            .about("Configuration console for distributed cache clusters")
            .arg(
                Arg::new("address")
                    .short('a')
                    .long("address")
                    .num_args(1)
                    .value_parser(value_parser!(SocketAddr))
                    .env("GRIDCONSOLE_ADDRESS")
                    .help("world-facing listen address (\"address:port\"), overriding configuration"),
            )
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .num_args(1)
                    .value_parser(value_parser!(PathBuf))
                    .env("GRIDCONSOLE_CONFIG")
                    .help(
                        "path (absolute or relative to the process' current directory) to a \
                       configuration file",
                    ),
            )
            .arg(
                Arg::new("debug")
                    .short('D')
                    .long("debug")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GRIDCONSOLE_DEBUG")
                    .help("produce debug output"),
            )
            .arg(
                Arg::new("plain")
                    .short('p')
                    .long("plain")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GRIDCONSOLE_PLAIN")
                    .help("log in human-readable format, not JSON/structured logging"),
            )
            .arg(
                Arg::new("quiet")
                    .short('q')
                    .long("quiet")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GRIDCONSOLE_QUIET")
                    .help("produce only error output"),
            )
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .num_args(0)
                    .action(ArgAction::SetTrue)
                    .env("GRIDCONSOLE_VERBOSE")
                    .help("produce prolix output"),
            )
            .get_matches(),
    )?;

    tokio::runtime::Runtime::new()
        .context(TokioRuntimeSnafu)?
        .block_on(go_async(opts))
}
