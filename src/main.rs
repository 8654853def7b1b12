use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use callboard::campaign::build_batch_request;
use callboard::config;
use callboard::dashboard::{disconnection_label, period_totals, Period};
use callboard::export::{export_csv, export_file_name, write_csv, Column};
use callboard::loader::LoadOutcome;
use callboard::model::{task_columns, Call};
use callboard::retell::CreatePhoneCallRequest;
use callboard::session::Session;
use callboard::stats::{calculate_stats, format_duration};
use callboard::view::{self, agenda_kinds, AgendaQuery, CallQuery, DateRange, DurationBucket};

#[derive(Debug, Parser)]
#[command(author, version, about = "Call analytics for a voice-AI tenant")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Resolve the tenant and its API key from this account email
    #[arg(long)]
    email: Option<String>,

    /// API key to use directly (falls back to RETELL_API_KEY, then the config)
    #[arg(long)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List, filter and export calls
    Calls {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        reason: Option<String>,
        /// lt-60, 60-180, 180-300 or gt-300
        #[arg(long)]
        duration: Option<DurationBucket>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "1")]
        page: usize,
        /// 25, 50 or 100
        #[arg(long, default_value = "25")]
        page_size: usize,
        /// Ignore the cache
        #[arg(long)]
        refresh: bool,
        /// Write the filtered calls as CSV; a directory gets calls_<date>.csv
        #[arg(long)]
        export: Option<PathBuf>,
        /// Comma-separated columns for the table and the export
        #[arg(long, value_delimiter = ',')]
        columns: Vec<Column>,
    },
    PhoneNumbers {
        #[arg(long)]
        refresh: bool,
    },
    Agents,
    BatchCalls {
        #[arg(long)]
        refresh: bool,
    },
    BatchTasks {
        batch_call_id: String,
    },
    /// Start a campaign from a recipients CSV
    CreateBatch {
        #[arg(long)]
        from_number: String,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        name: Option<String>,
        /// Zero-based index of the phone column when the header is not recognised
        #[arg(long)]
        phone_column: Option<usize>,
    },
    DeleteBatch {
        batch_call_id: String,
    },
    /// Place a single outbound call
    Call {
        #[arg(long)]
        from_number: String,
        #[arg(long)]
        to_number: String,
        #[arg(long)]
        agent_id: Option<String>,
    },
    Dashboard {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Only show the last N days of the daily breakdown
        #[arg(long)]
        last_days: Option<u32>,
    },
    Agendas {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Print an example configuration
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    let config_key = cfg.retell.api_key.clone();
    let session = Session::from_config(cfg)?;

    if let Some(email) = args.email.as_deref() {
        let client = session.sign_in(email).await?;
        info!(client_id = %client.client_id, "using tenant");
    } else if let Some(key) = args
        .api_key
        .or_else(|| std::env::var("RETELL_API_KEY").ok())
        .or(config_key)
    {
        session.set_api_key(&key).await?;
    } else {
        warn!("no email or API key given");
    }

    run(&session, args.command).await
}

fn report(what: &str, outcome: &LoadOutcome, last_error: Option<&str>) -> Result<()> {
    match outcome {
        LoadOutcome::MissingCredentials => Err(anyhow!("{}: API key not configured", what)),
        LoadOutcome::Failed { error } => Err(anyhow!("{}", error)),
        LoadOutcome::GaveUp | LoadOutcome::Unavailable => {
            match last_error {
                Some(err) => println!("{} unavailable ({}); use --refresh to retry", what, err),
                None => println!("No {} available", what),
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn run(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Calls {
            search,
            reason,
            duration,
            from,
            to,
            page,
            page_size,
            refresh,
            export,
            columns,
        } => {
            let page_size = view::check_page_size(page_size)?;
            let dates = DateRange { from, to };
            session.set_call_window(dates).await;
            let outcome = session.load_all_calls(refresh).await;
            if outcome == LoadOutcome::MissingCredentials {
                return Err(anyhow!("calls: API key not configured"));
            }
            let snap = session.calls().await;
            if let Some(err) = &snap.error {
                warn!(%err, "call list may be incomplete");
            }

            let query = CallQuery {
                search,
                disconnection_reason: reason,
                duration,
                dates,
            };
            let filtered = query.apply(&snap.calls);
            let columns = if columns.is_empty() {
                Column::default_selection()
            } else {
                columns
            };

            let owned: Vec<Call> = filtered.iter().map(|c| (*c).clone()).collect();
            let window = view::paginate(&owned, page, page_size);
            print!("{}", export_csv(window.items, &columns)?);
            let stats = calculate_stats(&owned);
            println!(
                "page {}/{} | {} of {} calls | completed {} | failed {} | avg {}",
                window.number,
                window.total_pages,
                filtered.len(),
                snap.total,
                stats.completed,
                stats.failed,
                stats.average_duration()
            );
            if !snap.disconnection_reasons.is_empty() {
                println!("reasons: {}", snap.disconnection_reasons.join(", "));
            }

            if let Some(path) = export {
                let path = if path.is_dir() {
                    path.join(export_file_name(Local::now().date_naive()))
                } else {
                    path
                };
                write_csv(&path, &export_csv(&owned, &columns)?).await?;
                println!("exported {} calls to {}", owned.len(), path.display());
            }
        }
        Command::PhoneNumbers { refresh } => {
            let outcome = session.load_phone_numbers(refresh).await;
            let snap = session.phone_numbers().await;
            report("phone numbers", &outcome, snap.last_error.as_deref())?;
            for n in snap.items.iter() {
                println!(
                    "{}\t{}\tin:{}\tout:{}",
                    n.phone_number_pretty.as_deref().unwrap_or(&n.phone_number),
                    n.nickname.as_deref().unwrap_or("-"),
                    n.inbound_agent_id.as_deref().unwrap_or("-"),
                    n.outbound_agent_id.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Agents => {
            for agent in session.agents().await? {
                println!(
                    "{}\t{}\t{}",
                    agent.agent_id,
                    agent.agent_name.as_deref().unwrap_or("-"),
                    agent.language.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::BatchCalls { refresh } => {
            let outcome = session.load_batch_calls(refresh).await;
            let snap = session.batch_calls().await;
            report("batch calls", &outcome, snap.last_error.as_deref())?;
            for b in snap.items.iter() {
                println!(
                    "{}\t{}\t{}\tsent {}\tpicked up {:.1}%\tcompleted {:.1}%",
                    b.batch_call_id,
                    b.name.as_deref().unwrap_or("-"),
                    b.status.as_deref().unwrap_or("-"),
                    b.sent,
                    b.pickup_rate(),
                    b.completion_rate(),
                );
            }
        }
        Command::BatchTasks { batch_call_id } => {
            let tasks = session.batch_call_tasks(&batch_call_id).await?;
            let columns = task_columns(&tasks);
            println!("{}", columns.join("\t"));
            for task in &tasks {
                let row = serde_json::to_value(task).context("failed to render task")?;
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| match row.get(c) {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(serde_json::Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    })
                    .collect();
                println!("{}", cells.join("\t"));
            }
        }
        Command::CreateBatch {
            from_number,
            csv,
            name,
            phone_column,
        } => {
            let content = tokio::fs::read_to_string(&csv)
                .await
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let request = build_batch_request(&from_number, name.as_deref(), &content, phone_column)?;
            let created = session.create_batch_call(&request).await?;
            println!(
                "created batch call {} with {} recipients",
                created.batch_call_id.as_deref().unwrap_or("(no id)"),
                request.tasks.len()
            );
        }
        Command::DeleteBatch { batch_call_id } => {
            session.delete_batch_call(&batch_call_id).await?;
            println!("deleted batch call {}", batch_call_id);
        }
        Command::Call {
            from_number,
            to_number,
            agent_id,
        } => {
            let created = session
                .create_phone_call(&CreatePhoneCallRequest {
                    from_number,
                    to_number,
                    override_agent_id: agent_id,
                    retell_llm_dynamic_variables: None,
                })
                .await?;
            println!(
                "call {} {}",
                created.call_id.as_deref().unwrap_or("(no id)"),
                created.call_status.as_deref().unwrap_or("")
            );
        }
        Command::Dashboard {
            from,
            to,
            last_days,
        } => {
            let Some(data) = session.dashboard(DateRange { from, to }).await? else {
                println!("No dashboard data available");
                return Ok(());
            };
            let t = &data.totals;
            println!(
                "calls {} | completed {} ({:.1}%) | failed {} ({:.1}%) | avg {} | cost {:.2}",
                t.total_calls,
                t.completed_calls,
                t.completed_pct,
                t.failed_calls,
                t.failed_pct,
                format_duration(t.average_duration_secs()),
                t.total_cost
            );
            let period = last_days.map_or(Period::All, Period::LastDays);
            let rows = data.daily_in(period, Local::now().date_naive());
            for row in &rows {
                println!("{}\t{}\t{:.2}", row.display_label(), row.total_calls, row.cost);
            }
            let (calls, cost) = period_totals(rows);
            println!("period: {} calls, {:.2}", calls, cost);
            for row in &data.hourly {
                println!("{}\t{}", row.display_label(), row.calls);
            }
            for r in data.top_reasons(5) {
                println!("{}\t{}\t{:.1}%", disconnection_label(&r.reason), r.total, r.percentage);
            }
        }
        Command::Agendas {
            search,
            kind,
            from,
            to,
            page,
        } => {
            let agendas = session.agendas().await?;
            let query = AgendaQuery {
                search,
                kind,
                dates: DateRange { from, to },
            };
            let filtered: Vec<_> = query.apply(&agendas).into_iter().cloned().collect();
            let window = view::paginate(&filtered, page, view::AGENDA_PAGE_SIZE);
            for a in window.items {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    a.scheduled_for.as_deref().unwrap_or("-"),
                    a.name.as_deref().unwrap_or("-"),
                    a.phone_number.as_deref().unwrap_or("-"),
                    a.city.as_deref().unwrap_or("-"),
                    a.kind.as_deref().unwrap_or("-"),
                );
            }
            println!(
                "page {}/{} | {} of {} agendas | types: {}",
                window.number,
                window.total_pages,
                filtered.len(),
                agendas.len(),
                agenda_kinds(&agendas).join(", ")
            );
        }
        Command::ExampleConfig => print!("{}", config::example()),
    }
    Ok(())
}
