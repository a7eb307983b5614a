use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, info_span};

use weather_core::{
    Config, DisplayLayout, DisplayStyle, RefreshState, SaveKeyOutcome, TickOutcome, Unit,
    refresh::REFRESH_JOB, run_hourly,
};

use crate::{app::App, display};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-widget", version, about = "Weather widget host")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key (encrypted). Leave blank to keep the current one.
    Configure {
        /// Key to store; prompts with a masked field when omitted.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Change widget settings. Omitted options keep their saved value.
    Widget {
        #[arg(long)]
        title: Option<String>,

        /// City name, e.g. "London". Pass an empty string to clear it.
        #[arg(long)]
        city: Option<String>,

        /// metric or imperial.
        #[arg(long)]
        unit: Option<Unit>,

        /// minimal, standard or advanced.
        #[arg(long)]
        style: Option<DisplayStyle>,

        /// vertical or horizontal (advanced style only).
        #[arg(long)]
        layout: Option<DisplayLayout>,
    },

    /// Render the widget.
    Show,

    /// Run one scheduled refresh now.
    Refresh,

    /// Keep refreshing hourly until interrupted.
    Watch,

    /// Re-establish the hourly refresh for the saved city.
    Activate,

    /// Cancel the hourly refresh.
    Deactivate,

    /// Show saved settings, key presence and refresh state.
    Status,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Configure { .. } => "configure",
            Command::Widget { .. } => "widget",
            Command::Show => "show",
            Command::Refresh => "refresh",
            Command::Watch => "watch",
            Command::Activate => "activate",
            Command::Deactivate => "deactivate",
            Command::Status => "status",
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let span = info_span!("command", name = self.command.name());
        self.dispatch().instrument(span).await
    }

    async fn dispatch(self) -> Result<()> {
        let app = App::build()?;
        debug!("stores and provider wired");

        match self.command {
            Command::Configure { api_key } => configure(&app, api_key)?,
            Command::Widget { title, city, unit, style, layout } => {
                let old = Config::load()?;
                let mut new = old.widget.clone();
                if let Some(title) = title {
                    new.title = title;
                }
                if let Some(city) = city {
                    new.city = city;
                }
                if let Some(unit) = unit {
                    new.unit = unit;
                }
                if let Some(style) = style {
                    new.display_style = style;
                }
                if let Some(layout) = layout {
                    new.display_layout = layout;
                }

                let saved = app.widget.update(new, &old.widget)?;
                info!(city = %saved.city, unit = %saved.unit, "widget settings updated");
                let cfg = Config { widget: saved };
                cfg.save()?;
                println!("Widget settings saved.");
                print_settings(&cfg);
            }
            Command::Show => {
                let cfg = Config::load()?;
                let rendered = app.widget.render(&cfg.widget).await;
                print!("{}", display::render_text(&rendered));
            }
            Command::Refresh => match app.refresh.on_tick().await {
                TickOutcome::Refreshed => println!("Weather cache refreshed."),
                TickOutcome::NoTarget => println!("No refresh city is scheduled."),
                TickOutcome::NoCredential => println!("No usable API key; nothing refreshed."),
                TickOutcome::Failed => println!("Refresh failed; see logs (RUST_LOG=debug)."),
            },
            Command::Watch => {
                let (tx, rx) = watch::channel(false);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        let _ = tx.send(true);
                    }
                });

                println!("Refreshing hourly; press Ctrl-C to stop.");
                run_hourly(&app.refresh, &app.scheduler, rx).await?;
                info!("hourly refresh loop stopped");
            }
            Command::Activate => {
                app.widget.activate()?;
                print_refresh_state(&app)?;
            }
            Command::Deactivate => {
                app.widget.deactivate()?;
                print_refresh_state(&app)?;
            }
            Command::Status => {
                let cfg = Config::load()?;
                print_settings(&cfg);
                if app.widget.has_api_key()? {
                    println!("API key:  {}", "•".repeat(16));
                } else {
                    println!("API key:  not configured (run `weather-widget configure`)");
                }
                print_refresh_state(&app)?;
            }
        }

        Ok(())
    }
}

fn configure(app: &App, api_key: Option<String>) -> Result<()> {
    let raw = match api_key {
        Some(key) => key,
        None => {
            let help = if app.widget.has_api_key()? {
                "Leave blank to keep existing key, or type a new one to replace it."
            } else {
                "Enter your OpenWeatherMap API key. It will be encrypted before storage."
            };
            Password::new("OpenWeather API key:")
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Masked)
                .with_help_message(help)
                .prompt()
                .context("Failed to read API key")?
        }
    };

    match app.widget.save_api_key(&raw)? {
        SaveKeyOutcome::Replaced => println!("API key saved, encrypted, and cache cleared."),
        SaveKeyOutcome::Unchanged => {
            println!("No new key entered; existing API key remains unchanged.")
        }
    }
    Ok(())
}

fn print_settings(cfg: &Config) {
    let w = &cfg.widget;
    println!("Title:    {}", w.display_title());
    println!("City:     {}", if w.has_city() { w.city.as_str() } else { "(not set)" });
    println!("Unit:     {}", w.unit);
    println!("Style:    {}", w.display_style);
    if w.display_style == DisplayStyle::Advanced {
        println!("Layout:   {}", w.display_layout);
    }
}

fn print_refresh_state(app: &App) -> Result<()> {
    match app.refresh.state()? {
        RefreshState::Scheduled(city) => {
            let next = app
                .scheduler
                .next_run(REFRESH_JOB)?
                .map(|at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("Refresh:  hourly for {city} (next run {next})");
        }
        RefreshState::Unscheduled => println!("Refresh:  not scheduled"),
    }
    Ok(())
}
