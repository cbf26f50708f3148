use anyhow::{Context, Result};
use base64::Engine as _;
use clap::{Parser, Subcommand};

#[zbus::proxy(
    interface = "org.presence.Attendance1",
    default_service = "org.presence.Attendance1",
    default_path = "/org/presence/Attendance1"
)]
trait Attendance {
    async fn begin_enrollment(&self, employee_id: &str) -> zbus::Result<String>;
    async fn capture_angle(
        &self,
        session_id: &str,
        angle: &str,
        image: &str,
    ) -> zbus::Result<String>;
    async fn cancel_enrollment(&self, session_id: &str) -> zbus::Result<bool>;
    async fn verify(&self, employee_id: &str, image: &str) -> zbus::Result<String>;
    async fn verify_video(&self, employee_id: &str, frames: &str) -> zbus::Result<String>;
    async fn check_liveness(&self, frames: &str) -> zbus::Result<String>;
    async fn pending_enrollments(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "presence", about = "Presence attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage multi-angle enrollment sessions
    Enroll {
        #[command(subcommand)]
        command: EnrollCommands,
    },
    /// Verify a single image against an employee's template
    Verify {
        /// Employee identifier
        employee_id: String,
        /// Path to a JPEG or PNG image
        image: String,
    },
    /// Verify a frame sequence against an employee's template
    VerifyVideo {
        /// Employee identifier
        employee_id: String,
        /// Paths to JPEG or PNG frames, in capture order
        frames: Vec<String>,
    },
    /// Run liveness checks on a frame sequence without matching
    Liveness {
        /// Paths to JPEG or PNG frames, in capture order
        frames: Vec<String>,
    },
    /// List enrollment sessions still collecting captures
    Pending,
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum EnrollCommands {
    /// Start an enrollment session
    Begin {
        /// Employee identifier
        employee_id: String,
    },
    /// Submit one angle capture for a session
    Capture {
        /// Session ID from `enroll begin`
        session_id: String,
        /// Capture angle (front, left, right, up, down)
        angle: String,
        /// Path to a JPEG or PNG image
        image: String,
    },
    /// Cancel an open session
    Cancel {
        /// Session ID to discard
        session_id: String,
    },
}

fn encode_image(path: &str) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn encode_frames(paths: &[String]) -> Result<String> {
    let encoded: Vec<String> = paths
        .iter()
        .map(|p| encode_image(p))
        .collect::<Result<_>>()?;
    Ok(serde_json::to_string(&encoded)?)
}

fn print_json(reply: &str) {
    match serde_json::from_str::<serde_json::Value>(reply) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{reply}"),
        },
        Err(_) => println!("{reply}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to session bus")?;
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("connecting to presenced")?;

    match cli.command {
        Commands::Enroll { command } => match command {
            EnrollCommands::Begin { employee_id } => {
                print_json(&proxy.begin_enrollment(&employee_id).await?);
            }
            EnrollCommands::Capture {
                session_id,
                angle,
                image,
            } => {
                let payload = encode_image(&image)?;
                print_json(&proxy.capture_angle(&session_id, &angle, &payload).await?);
            }
            EnrollCommands::Cancel { session_id } => {
                proxy.cancel_enrollment(&session_id).await?;
                println!("Session {session_id} cancelled");
            }
        },
        Commands::Verify { employee_id, image } => {
            let payload = encode_image(&image)?;
            print_json(&proxy.verify(&employee_id, &payload).await?);
        }
        Commands::VerifyVideo {
            employee_id,
            frames,
        } => {
            anyhow::ensure!(!frames.is_empty(), "at least one frame is required");
            let payload = encode_frames(&frames)?;
            print_json(&proxy.verify_video(&employee_id, &payload).await?);
        }
        Commands::Liveness { frames } => {
            anyhow::ensure!(!frames.is_empty(), "at least one frame is required");
            let payload = encode_frames(&frames)?;
            print_json(&proxy.check_liveness(&payload).await?);
        }
        Commands::Pending => {
            print_json(&proxy.pending_enrollments().await?);
        }
        Commands::Status => {
            print_json(&proxy.status().await?);
        }
    }

    Ok(())
}
