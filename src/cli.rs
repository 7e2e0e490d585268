use crate::auth::MAX_SESSION_HOURS;

fn is_duration(value: String) -> Result<(), String> {
    match value.parse::<i64>() {
        Ok(hours) if (1..=MAX_SESSION_HOURS).contains(&hours) => Ok(()),
        Ok(_) => Err(format!(
            "duration must be between 1 and {} hours",
            MAX_SESSION_HOURS
        )),
        Err(err) => Err(format!("'{}' is not a number of hours, {}", value, err)),
    }
}

pub fn ask<'a, 'b>() -> clap::App<'a, 'b> {
    clap::App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .arg(
            clap::Arg::with_name("config")
                .short("c")
                .long("config")
                .help("Path to .jobstorerc file")
                .default_value(".jobstorerc")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("secret")
                .short("s")
                .long("secret")
                .help("Secret to sign and verify session tokens. Can also be provided in the .jobstorerc file")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Makes jobstore verbose. Useful for debugging and seeing what's going on \"under the hood\"")
        )
        .subcommand(
            clap::App::new("serve")
                .about("Start the job listing server")
                .arg(
                    clap::Arg::with_name("port")
                        .short("p")
                        .long("port")
                        .help("Custom server port [default: 8000]")
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::with_name("database")
                        .short("d")
                        .long("database")
                        .help("Database directory [default: ~/.jobstore]")
                        .takes_value(true),
                ),
        )
        .subcommand(
            clap::App::new("token")
                .about("Create a session token to use as a Bearer token against the API")
                .arg(
                    clap::Arg::with_name("username")
                        .short("u")
                        .long("username")
                        .help("User the token is issued for")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    clap::Arg::with_name("duration")
                        .short("d")
                        .long("duration")
                        .help("Token duration until expires in hours [default: auth.session_hours]")
                        .validator(is_duration)
                        .takes_value(true),
                )
        )
}
