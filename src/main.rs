use actix_cors::Cors;
use clap::value_t;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process;

#[macro_use]
extern crate log;

mod auth;
mod cli;
mod config;
mod database;
mod errors;
mod handlers;
mod job;
mod store;

use config::{ConfigFile, Context};
use store::JobStore;

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    let matches = cli::ask().get_matches();

    let log_filter = if matches.is_present("verbose") {
        "jobstore=debug,actix_web=debug"
    } else {
        "jobstore=info,actix_web=info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter)).init();

    let config_path = matches
        .value_of("config")
        .map(|path| shellexpand::tilde(&path).into_owned())
        .unwrap_or_else(|| ".jobstorerc".to_owned());

    let config = match ConfigFile::read(&config_path, matches.occurrences_of("config") > 0) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let maybe_secret = matches
        .value_of("secret")
        .map(|s| s.to_string())
        .or_else(|| config.secret.clone());

    let secret = match maybe_secret {
        Some(s) => s,
        None => {
            eprintln!("Secret is required");
            process::exit(1);
        }
    };

    if let Some(token) = matches.subcommand_matches("token") {
        let username = token.value_of("username").unwrap_or_default();
        let hours = if token.is_present("duration") {
            clap::value_t!(token, "duration", i64).unwrap_or_else(|err| err.exit())
        } else {
            config.auth.session_hours
        };

        match auth::create_token(&secret, username, hours) {
            Ok(token) => println!("Bearer {}", token),
            Err(err) => {
                eprintln!("Failed to create token {}", err);
                process::exit(1);
            }
        }
        return Ok(());
    }

    let serve = match matches.subcommand_matches("serve") {
        Some(serve) => serve,
        None => {
            eprintln!("{}", matches.usage());
            process::exit(1);
        }
    };

    let port: u16 = serve
        .value_of("port")
        .and_then(|port| port.parse().ok())
        .or(config.port)
        .unwrap_or(config::DEFAULT_PORT);

    let database_dir = serve
        .value_of("database")
        .map(|s| s.to_string())
        .or_else(|| config.database.clone())
        .unwrap_or_else(|| config::DEFAULT_DATABASE_DIR.to_owned());

    let database_path = config::database_file(&database_dir);
    debug!("Using database at {}", &database_path);

    let store = web::Data::new(JobStore::connect(&database_path, config.pool.clone()).await);
    let context = web::Data::new(Context::new(secret, &config));

    let localhost = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
    let socket = SocketAddr::new(localhost, port);

    info!("Starting jobstore at {}", &socket);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::new().supports_credentials().finish())
            .app_data(context.clone())
            .app_data(store.clone())
            .configure(handlers::configure)
    })
    .client_timeout(15_000)
    .shutdown_timeout(5)
    .bind(socket)?
    .run()
    .await
}
