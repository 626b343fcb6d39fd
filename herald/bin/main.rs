use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use herald::{Attachment, Herald, Message};

/// Send mail through the server described by a herald configuration file.
#[derive(Parser)]
#[command(name = "herald", version, about)]
struct Cli {
    /// Configuration file (otherwise `HERALD_CONFIG`, then the default paths)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, authenticate and disconnect without sending anything
    Verify,
    /// Send one message
    Send(MessageArgs),
    /// Print the message exactly as it would be transmitted
    Preview(MessageArgs),
}

#[derive(Args)]
struct MessageArgs {
    /// Recipient (repeatable)
    #[arg(long, required = true)]
    to: Vec<String>,

    #[arg(long)]
    cc: Vec<String>,

    #[arg(long)]
    bcc: Vec<String>,

    /// Overrides the configured sender
    #[arg(long)]
    from: Option<String>,

    #[arg(long, default_value = "")]
    subject: String,

    /// Plain text body
    #[arg(long, default_value = "")]
    body: String,

    /// HTML body, read from a file
    #[arg(long)]
    html: Option<PathBuf>,

    /// Attachment as `PATH` or `PATH:MIME/TYPE` (repeatable)
    #[arg(long)]
    attach: Vec<String>,

    /// 1 (highest) to 5 (lowest)
    #[arg(long)]
    priority: Option<i32>,
}

impl MessageArgs {
    async fn into_message(self) -> anyhow::Result<Message> {
        let mut message = Message::new();
        if let Some(from) = self.from {
            message.set_from(from);
        }
        for to in self.to {
            message.add_to(to);
        }
        for cc in self.cc {
            message.add_cc(cc);
        }
        for bcc in self.bcc {
            message.add_bcc(bcc);
        }
        message.set_subject(self.subject).set_plain_body(self.body);

        if let Some(path) = self.html {
            let html = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read HTML body from {}", path.display()))?;
            message.set_html_body(html);
        }

        for attachment in self.attach {
            let (path, mime_type) = attachment
                .split_once(':')
                .unwrap_or((attachment.as_str(), "application/octet-stream"));
            let path = PathBuf::from(path);
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read attachment {}", path.display()))?;
            let filename = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
            message.add_attachment(Attachment::new(filename, mime_type, data));
        }

        if let Some(priority) = self.priority {
            message.set_priority(priority);
        }

        Ok(message)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald::logging::init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let herald = Herald::from_file(&config_path)?;
    let mailer = herald.mailer()?;

    match cli.command {
        Command::Verify => {
            mailer.verify().await?;
            println!("{} accepted the connection", herald.session.address());
        }
        Command::Send(args) => {
            let message = args.into_message().await?;
            mailer.send(&message).await?;
            println!("Sent to {} recipient(s)", message.recipients().len());
        }
        Command::Preview(args) => {
            let message = args.into_message().await?;
            print!("{}", mailer.prepare(&message)?);
        }
    }

    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
fn find_config_file() -> anyhow::Result<PathBuf> {
    if let Ok(env_path) = std::env::var("HERALD_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "HERALD_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./herald.config.ron"),
        PathBuf::from("/etc/herald/herald.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - HERALD_CONFIG environment variable\n{paths_tried}"
    )
}
