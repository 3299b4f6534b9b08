use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use rollcall_cli::commands::{self, ListArgs};
use rollcall_cli::{students, CliDirection, CliSortOrder, Workspace};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Keep settings and logs here instead of the platform directories.
    #[arg(long, global = true, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<Utf8PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find nearby scanners and pull their logs until stopped
    Receive {
        #[arg(long, help = "Only start if auto-start is enabled in settings")]
        on_boot: bool,
    },
    /// Advertise this device and hand out its unsent logs
    Host {
        #[arg(long, help = "Name shown to receivers (defaults to the device id)")]
        name: Option<String>,
    },
    /// Record one attendance scan
    Record {
        student_id: String,
        #[arg(value_enum)]
        direction: CliDirection,
    },
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Accept a scanned pairing code
    Pair {
        code: String,
        #[arg(long, help = "Start receiving once paired")]
        start: bool,
    },
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    Logs {
        #[command(subcommand)]
        command: LogsCommands,
    },
    Students {
        #[command(subcommand)]
        command: StudentsCommands,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Print a fresh pairing code for this device
    Issue,
    Check { code: String },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    #[command(name = "set-window")]
    SetWindow {
        #[arg(value_enum)]
        direction: CliDirection,
        #[arg(help = "HH:MM")]
        start: String,
        #[arg(help = "HH:MM")]
        end: String,
    },
    #[command(name = "auto-start")]
    AutoStart {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    #[command(name = "utc-offset")]
    UtcOffset {
        #[arg(allow_hyphen_values = true, help = "Minutes east of UTC")]
        minutes: i32,
    },
}

#[derive(Subcommand)]
enum LogsCommands {
    List {
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, value_enum, default_value_t = CliSortOrder::Desc)]
        order: CliSortOrder,
        #[arg(long, conflicts_with = "unsent")]
        student: Option<String>,
        #[arg(long, help = "Only logs not yet handed to a receiver")]
        unsent: bool,
    },
}

#[derive(Subcommand)]
enum StudentsCommands {
    List,
    Add {
        #[arg(long)]
        id: String,
        name: String,
        #[arg(long, default_value = "")]
        grade: String,
        #[arg(long, default_value = "")]
        section: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ws = Workspace::open(cli.data_dir)?;

    match cli.command {
        Commands::Receive { on_boot } => commands::cmd_receive(&ws, on_boot).await?,
        Commands::Host { name } => commands::cmd_host(&ws, name).await?,
        Commands::Record {
            student_id,
            direction,
        } => commands::cmd_record(&ws, &student_id, direction.into())?,
        Commands::Token { command } => match command {
            TokenCommands::Issue => commands::cmd_token_issue(&ws)?,
            TokenCommands::Check { code } => commands::cmd_token_check(&code)?,
        },
        Commands::Pair { code, start } => commands::cmd_pair(&ws, &code, start).await?,
        Commands::Settings { command } => match command {
            SettingsCommands::Show => commands::cmd_settings_show(&ws)?,
            SettingsCommands::SetWindow {
                direction,
                start,
                end,
            } => commands::cmd_settings_set_window(&ws, direction.into(), &start, &end)?,
            SettingsCommands::AutoStart { enabled } => {
                commands::cmd_settings_auto_start(&ws, enabled)?
            }
            SettingsCommands::UtcOffset { minutes } => {
                commands::cmd_settings_utc_offset(&ws, minutes)?
            }
        },
        Commands::Logs { command } => match command {
            LogsCommands::List {
                fields,
                page_size,
                page,
                sort,
                order,
                student,
                unsent,
            } => commands::cmd_logs_list(
                &ws,
                ListArgs {
                    fields,
                    page_size,
                    page,
                    sort,
                    order,
                    student,
                    unsent,
                },
            )?,
        },
        Commands::Students { command } => match command {
            StudentsCommands::List => students::handle_list(&ws)?,
            StudentsCommands::Add {
                id,
                name,
                grade,
                section,
            } => students::handle_add(&ws, id, name, grade, section)?,
        },
    }

    Ok(())
}
