use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mb")]
#[command(about = "Automated messaging client - drive a scripted session from the command line")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Credential file (defaults to an in-memory store)
	#[arg(long, global = true, value_name = "FILE")]
	pub credentials: Option<PathBuf>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a full lifecycle against the scripted driver: initialize, pair
	/// or restore, send messages, and tear down
	Demo {
		/// Resume from stored credentials instead of pairing
		#[arg(long)]
		restored: bool,

		/// Messages to send once connected
		#[arg(short, long, default_value = "hello from mb")]
		message: Vec<String>,

		/// Recipient key for the demo messages
		#[arg(short, long, default_value = "demo-recipient")]
		recipient: String,
	},

	/// Inspect or discard stored credentials
	Credentials {
		#[command(subcommand)]
		action: CredentialsAction,
	},
}

#[derive(Subcommand, Debug)]
pub enum CredentialsAction {
	/// Print the stored blob's schema and age
	Show,
	/// Remove the stored blob (a backup is kept beside it)
	Clear,
}
