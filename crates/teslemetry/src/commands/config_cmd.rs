//! Config subcommand handlers.

use teslemetry_config::{self as config, Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

fn parse<T: std::str::FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

fn set_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "access_token_env" | "access-token-env" => profile.access_token_env = Some(value),
        "base_url" | "base-url" => profile.base_url = Some(value),
        "stream_url" | "stream-url" => profile.stream_url = Some(value),
        "streaming" => profile.streaming = Some(parse(key, &value, "'true' or 'false'")?),
        "timeout" => profile.timeout = Some(parse(key, &value, "a number (seconds)")?),
        "vehicle_interval" | "vehicle-interval" => {
            profile.vehicle_interval = Some(parse(key, &value, "a number (seconds)")?);
        }
        "energy_live_interval" | "energy-live-interval" => {
            profile.energy_live_interval = Some(parse(key, &value, "a number (seconds)")?);
        }
        "energy_info_interval" | "energy-info-interval" => {
            profile.energy_info_interval = Some(parse(key, &value, "a number (seconds)")?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: access_token_env, base_url, \
                     stream_url, streaming, timeout, vehicle_interval, energy_live_interval, \
                     energy_info_interval"
                ),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config()?;
            for profile in cfg.profiles.values_mut() {
                if profile.access_token.is_some() {
                    profile.access_token = Some("********".into());
                }
            }
            let out = output::render_single(&global.output, &cfg, |c| {
                toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?} ({e})"))
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config()?;
            let profile_name = active_profile_name(global, &cfg);
            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_key(profile, &key, value)?;

            config::save_config(&cfg)?;
            eprintln!("✓ Set {key} on profile '{profile_name}'");
            Ok(())
        }

        ConfigCommand::SetToken { plaintext } => {
            let mut cfg = config::load_config()?;
            let profile_name = active_profile_name(global, &cfg);

            let token = rpassword::prompt_password(format!("Access token for '{profile_name}': "))?;
            if token.trim().is_empty() {
                return Err(CliError::Validation {
                    field: "access_token".into(),
                    reason: "access token cannot be empty".into(),
                });
            }

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            if plaintext {
                profile.access_token = Some(token.trim().to_owned());
            } else {
                config::store_access_token(&profile_name, token.trim())?;
                eprintln!("   ✓ Access token stored in system keyring");
            }
            config::save_config(&cfg)?;
            eprintln!("✓ Profile '{profile_name}' saved to {}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: teslemetry config set-token");
            } else {
                let mut names: Vec<_> = cfg.profiles.keys().collect();
                names.sort();
                for name in names {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;

            if !cfg.profiles.contains_key(&name) {
                let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
                available.sort();
                return Err(CliError::ProfileNotFound {
                    name,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available.join(", ")
                    },
                });
            }

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("✓ Default profile set to '{name}'");
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_key_parses_typed_values() {
        let mut profile = Profile::default();
        set_key(&mut profile, "streaming", "false".into()).unwrap();
        set_key(&mut profile, "vehicle-interval", "45".into()).unwrap();

        assert_eq!(profile.streaming, Some(false));
        assert_eq!(profile.vehicle_interval, Some(45));
    }

    #[test]
    fn set_key_rejects_unknown_and_malformed() {
        let mut profile = Profile::default();
        assert!(matches!(
            set_key(&mut profile, "colour", "red".into()),
            Err(CliError::Validation { .. })
        ));
        assert!(set_key(&mut profile, "timeout", "soon".into()).is_err());
    }
}
