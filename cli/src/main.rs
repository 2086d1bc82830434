#[macro_use] extern crate clap;

use clap::{App, ArgMatches};
use env_logger::{from_env, Env};
use imsave::{
    registry::{Credentials, PASSWORD_ENV},
    SaveOptions,
};

#[tokio::main]
async fn main() {
    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml)
        .version(crate_version!())
        .get_matches();

    let log_level = if matches.is_present("debug") {
        "debug"
    } else {
        matches.value_of("log_level").unwrap_or("info")
    };
    from_env(Env::default().default_filter_or(log_level)).init();

    let options = save_options(&matches);
    println!("Using architecture: {}", options.filter().architecture_str());

    match imsave::save(&options).await {
        Ok(output) => println!("Output file: {}", output.display()),
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(1);
        }
    }
}

fn save_options(matches: &ArgMatches) -> SaveOptions {
    let mut options = SaveOptions::new(matches.value_of("image_reference").unwrap_or_default())
        .mirror(matches.value_of("mirror").unwrap_or_default())
        .insecure(matches.is_present("insecure"))
        .show_progress(!matches.is_present("quiet"))
        .credentials(Credentials::resolve(
            matches.value_of("user"),
            matches.value_of("passwd"),
            std::env::var(PASSWORD_ENV).ok(),
        ));
    if matches.is_present("os") {
        options = options.os(&string_values(matches, "os")[..]);
    }
    if matches.is_present("arch") {
        options = options.arch(&string_values(matches, "arch")[..]);
    }
    if let Some(output) = matches.value_of("output") {
        options = options.output(output);
    }
    options
}

/// All values given for an option, skipping empty ones so that `--arch ''`
/// accepts any architecture
fn string_values<S: AsRef<str>>(matches: &ArgMatches, name: S) -> Vec<String> {
    matches
        .values_of(name)
        .into_iter()
        .flatten()
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .collect()
}
