//! Aeromed - Mission Lifecycle Core for Medical Drone Delivery
//!
//! Operator CLI entry point.

use aeromed::auth::{Actor, Identity, Role};
use aeromed::config::AeromedConfig;
use aeromed::mission::{
    Mission, MissionControl, MissionDraft, MissionKind, MissionStatus, Party, Priority,
};
use aeromed::notify::{Dispatcher, EmailAddress, NotificationLog, SmtpTransport, Template};
use aeromed::store::{MissionStore, SqliteStore};
use clap::{Args, Parser, Subcommand};
use std::process;
use std::sync::Arc;

/// Aeromed - medical drone delivery mission control
#[derive(Parser, Debug)]
#[command(name = "aeromed")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/aeromed/config.yaml)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// The acting caller. In production deployments the Role Gateway supplies
/// this; at the command line the operator asserts it.
#[derive(Args, Debug)]
struct ActorArgs {
    /// Acting user id
    #[arg(long, default_value = "operator")]
    actor: String,

    /// Acting role (patient, clinic, admin, system)
    #[arg(long, default_value = "admin")]
    role: String,

    /// Actor display name
    #[arg(long, default_value = "Operator")]
    name: String,

    /// Actor contact email (where status notifications go)
    #[arg(long)]
    email: Option<String>,
}

impl ActorArgs {
    fn to_actor(&self) -> aeromed::Result<Actor> {
        let role: Role = self.role.parse()?;
        let mut identity = Identity::new(&self.actor, &self.name);
        if let Some(email) = &self.email {
            identity = identity.with_email(EmailAddress::new(email)?);
        }
        Ok(Actor::new(identity, role))
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a default configuration file
    Init,

    /// Submit a new delivery request (patient role)
    Request {
        /// Medical item descriptor, e.g. "insulin, 2 vials"
        items: String,

        /// Delivery address
        address: String,

        /// Priority (low, normal, high, emergency)
        #[arg(short, long, default_value = "normal")]
        priority: String,

        /// Mission kind (delivery, pickup, emergency)
        #[arg(short, long, default_value = "delivery")]
        kind: String,

        /// Delivery latitude
        #[arg(long)]
        lat: Option<f64>,

        /// Delivery longitude
        #[arg(long)]
        lon: Option<f64>,

        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Accept a requested mission (clinic role)
    Accept {
        id: i64,
        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Reject a requested mission (clinic role)
    Reject {
        id: i64,
        /// Reason shown to the patient and recorded in the audit trail
        #[arg(short, long)]
        reason: Option<String>,
        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Reserve a drone for an accepted mission
    Assign {
        id: i64,
        /// Drone id to reserve
        drone: i64,
        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Confirm launch; the mission goes in transit
    Launch {
        id: i64,
        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Confirm delivery; the mission closes successfully
    Deliver {
        id: i64,
        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Record an irrecoverable fault; the mission closes as failed
    Fail {
        id: i64,
        /// Fault description
        reason: String,
        #[command(flatten)]
        as_actor: ActorArgs,
    },

    /// Show a mission
    Show { id: i64 },

    /// Show a mission's audit trail
    Log { id: i64 },

    /// List missions, optionally by status
    Missions {
        /// Filter by status (requested, accepted, assigned, in_transit,
        /// delivered, rejected, failed)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Fleet roster operations
    #[command(subcommand)]
    Drone(DroneCommands),

    /// Send a test message through the configured mail transport
    TestMail {
        /// Recipient address
        to: String,
    },
}

#[derive(Subcommand, Debug)]
enum DroneCommands {
    /// Register a drone
    Add { name: String },
    /// List registered drones
    List,
}

#[tokio::main]
async fn main() {
    if let Err(e) = aeromed::logging::init() {
        eprintln!("warning: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> aeromed::Result<()> {
    let config_path = cli
        .config
        .map(Into::into)
        .unwrap_or_else(AeromedConfig::default_path);

    if let Commands::Init = cli.command {
        AeromedConfig::write_default(&config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let config = AeromedConfig::load(&config_path)?;
    let store = Arc::new(SqliteStore::open(&config.storage.path)?);
    let log: Arc<dyn NotificationLog> = store.clone();
    let mission_store: Arc<dyn MissionStore> = store.clone();
    let sender = config.mail.sender_address()?;
    let transport = Arc::new(SmtpTransport::new(config.mail.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(transport, sender)
            .with_retry(config.dispatch.retry_config())
            .with_log(log),
    );
    let control = MissionControl::new(mission_store, Arc::clone(&dispatcher))
        .with_fleet(&config.fleet);

    match cli.command {
        Commands::Init => unreachable!("handled above"),

        Commands::Request {
            items,
            address,
            priority,
            kind,
            lat,
            lon,
            as_actor,
        } => {
            let actor = as_actor.to_actor()?;
            let priority = Priority::parse(&priority).ok_or_else(|| {
                aeromed::AeromedError::Validation(format!("unknown priority '{}'", priority))
            })?;
            let kind = MissionKind::parse(&kind).ok_or_else(|| {
                aeromed::AeromedError::Validation(format!("unknown mission kind '{}'", kind))
            })?;

            let mut draft = MissionDraft::new(Party::from(&actor), items, address)
                .with_priority(priority)
                .with_kind(kind);
            if let (Some(lat), Some(lon)) = (lat, lon) {
                draft = draft.with_coordinates(lat, lon);
            }

            let mission = control.request(&actor, draft).await?;
            print_mission(&mission);
        }

        Commands::Accept { id, as_actor } => {
            let mission = control.accept(&as_actor.to_actor()?, id).await?;
            print_mission(&mission);
        }

        Commands::Reject { id, reason, as_actor } => {
            let mission = control.reject(&as_actor.to_actor()?, id, reason).await?;
            print_mission(&mission);
        }

        Commands::Assign { id, drone, as_actor } => {
            let mission = control.assign(&as_actor.to_actor()?, id, drone).await?;
            print_mission(&mission);
        }

        Commands::Launch { id, as_actor } => {
            let mission = control.confirm_launch(&as_actor.to_actor()?, id).await?;
            print_mission(&mission);
        }

        Commands::Deliver { id, as_actor } => {
            let mission = control.confirm_delivery(&as_actor.to_actor()?, id).await?;
            print_mission(&mission);
        }

        Commands::Fail { id, reason, as_actor } => {
            let mission = control.fail(&as_actor.to_actor()?, id, reason).await?;
            print_mission(&mission);
        }

        Commands::Show { id } => {
            print_mission(&control.get(id)?);
        }

        Commands::Log { id } => {
            for entry in control.audit_log(id)? {
                println!(
                    "{:>3}  {:<11} {:<8} {:<12} {}{}",
                    entry.seq,
                    entry.status,
                    entry.actor_role,
                    entry.actor_id,
                    entry.occurred_at.format("%Y-%m-%d %H:%M:%S"),
                    entry
                        .note
                        .map(|n| format!("  ({})", n))
                        .unwrap_or_default(),
                );
            }
        }

        Commands::Missions { status } => {
            let status = match status {
                Some(s) => Some(MissionStatus::parse(&s).ok_or_else(|| {
                    aeromed::AeromedError::Validation(format!("unknown status '{}'", s))
                })?),
                None => None,
            };
            for mission in store.list_missions(status)? {
                println!(
                    "#{:<5} {:<11} {:<9} {:<24} {}",
                    mission.id,
                    mission.status,
                    mission.priority.as_str(),
                    mission.requester.name,
                    mission.delivery_address,
                );
            }
        }

        Commands::Drone(DroneCommands::Add { name }) => {
            let drone = store.add_drone(&name)?;
            println!("Registered drone #{} '{}'", drone.id, drone.name);
        }

        Commands::Drone(DroneCommands::List) => {
            for drone in store.list_drones()? {
                println!("#{:<4} {:<20} {}", drone.id, drone.name, drone.status);
            }
        }

        Commands::TestMail { to } => {
            let to = EmailAddress::new(&to)?;
            let template = Template::Maintenance {
                title: "Test Message".into(),
                message: "This is a test of the Aeromed mail transport configuration.".into(),
                window: None,
            };
            let outcome = dispatcher.send(None, &to, &template).await;
            println!("{:?}", outcome);
        }
    }

    Ok(())
}

fn print_mission(mission: &Mission) {
    println!("Mission #{}", mission.id);
    println!("  status:    {}", mission.status);
    println!("  kind:      {}", mission.kind.as_str());
    println!("  priority:  {}", mission.priority.as_str());
    println!("  items:     {}", mission.items);
    println!("  address:   {}", mission.delivery_address);
    println!(
        "  requester: {} ({})",
        mission.requester.name, mission.requester.id
    );
    if let Some(clinic) = &mission.clinic {
        println!("  clinic:    {} ({})", clinic.name, clinic.id);
    }
    if let Some(drone_id) = mission.drone_id {
        println!("  drone:     #{}", drone_id);
    }
    println!("  version:   {}", mission.version);
}
