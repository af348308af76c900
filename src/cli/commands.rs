use clap::{Args, Subcommand};
use cartwright_core_types::FulfillmentMode;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the HTTP control plane and the job scheduler
    Serve(ServeArgs),

    /// Create a job for a chat and run it in the foreground
    RunJob(ChatArgs),

    /// Add items to a chat's shopping list
    Add(AddArgs),

    /// Show a chat's shopping list
    List(ChatArgs),

    /// Empty a chat's shopping list
    Clear(ChatArgs),

    /// Set the postal code and fulfillment preference for a chat
    SetLocation(SetLocationArgs),

    /// Log in to the store account in a visible browser and save the session
    Link,

    /// Clear a verification challenge in a visible browser and re-queue the job
    Resume(JobArgs),

    /// Show a job's status
    Status(JobArgs),
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Address to listen on (overrides `server.bind`)
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args, Clone)]
pub struct ChatArgs {
    pub chat_id: String,
}

#[derive(Args, Clone)]
pub struct AddArgs {
    pub chat_id: String,

    /// Items, separated by commas or newlines, e.g. "milk x2, eggs (max $5)"
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,
}

#[derive(Args, Clone)]
pub struct SetLocationArgs {
    pub chat_id: String,
    pub postal_code: String,

    /// delivery or pickup
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<FulfillmentMode>,

    /// Preferred store name
    #[arg(long)]
    pub store: Option<String>,
}

#[derive(Args, Clone)]
pub struct JobArgs {
    pub job_id: String,
}

fn parse_mode(raw: &str) -> Result<FulfillmentMode, String> {
    raw.parse().map_err(|err| format!("{err}"))
}
