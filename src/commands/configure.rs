use inquire::{Confirm, Password, Select, Text};

use crate::config::{Config, ProgressMode, Protocol};

use super::ConfigureArgs;

pub fn configure(args: ConfigureArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.get_path {
        let _ = Config::file_path().inspect(|path| println!("{}", path));
        return Ok(());
    }

    let mut config = if args.update {
        Config::load()?
    } else {
        Config::default()
    };

    config.protocol = prompt_options("Choose a protocol", &Protocol::all(), config.protocol)?;
    config.host = prompt_string("Enter the server host", Some(&config.host))?;
    config.port = prompt_optional(
        "Enter the port (leave empty for the protocol default)",
        config.port.map(|port| port.to_string()).as_ref(),
    )?
    .map(|port| port.parse::<u16>())
    .transpose()?;
    config.user = prompt_string("Enter the user name", Some(&config.user))?;

    if prompt_yes_no("Do you want to store a password?")? {
        config.password = Some(
            Password::new("Enter the password")
                .without_confirmation()
                .prompt()?,
        );
    }

    config.database = prompt_string("Enter the default database", Some(&config.database))?;
    config.format = prompt_optional(
        "Enter the default output format (leave empty for the mode default)",
        config.format.as_ref(),
    )?;
    config.pager = prompt_optional(
        "Enter a pager command for the shell (e.g., less -S -R)",
        config.pager.as_ref(),
    )?;
    config.progress_mode = prompt_options(
        "How should progress be reported?",
        &ProgressMode::all(),
        config.progress_mode,
    )?;
    config.stacktrace = prompt_yes_no("Do you want server stack traces in error messages?")?;

    save_configuration(&config)?;

    Ok(())
}

fn prompt_yes_no(question: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let answer = Confirm::new(question).with_default(false).prompt()?;

    Ok(answer)
}

fn prompt_string(
    prompt: &str,
    default: Option<&String>,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut text = Text::new(prompt);

    if let Some(default) = default {
        text = text.with_default(default);
    }

    Ok(text.prompt()?)
}

/// Empty input means "not set".
fn prompt_optional(
    prompt: &str,
    default: Option<&String>,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let answer = prompt_string(prompt, default)?;
    let answer = answer.trim();

    Ok((!answer.is_empty()).then(|| answer.to_string()))
}

fn prompt_options<T>(
    prompt: &str,
    options: &[T],
    current: T,
) -> Result<T, Box<dyn std::error::Error>>
where
    T: Clone + PartialEq + std::fmt::Display,
{
    let cursor = options
        .iter()
        .position(|option| *option == current)
        .unwrap_or_default();

    let selection = Select::new(prompt, options.to_vec())
        .with_starting_cursor(cursor)
        .with_vim_mode(true)
        .prompt()?;

    Ok(selection)
}

fn save_configuration(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    config.store()?;

    match Config::file_path() {
        Ok(path) => println!("Saved config to {:?}", path),
        Err(_) => println!("Saved configuration"),
    }

    Ok(())
}
