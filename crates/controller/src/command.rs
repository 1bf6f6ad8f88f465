//! Remote command vocabulary. Text is decoded once into [`Command`] at the
//! transport boundary; the controller only ever matches on the enum.

pub const MSG_GREETING: &str =
    "Dutch Bucket controller is online. Send /help for a list of commands.";
pub const MSG_UNAUTHORIZED: &str = "Unauthorized user";
pub const MSG_INVALID: &str = "That is not a valid command.";
pub const MSG_LOW_WATER: &str =
    "Dutch Bucket - Water level is LOW! Please refill the reservoir.";
pub const MSG_NUTRIENT_DUE: &str =
    "Dutch Bucket - Time to refill your nutrients! Send /dutchnutrient once done.";

/// An inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub chat_id: String,
    pub from_name: String,
    pub text: String,
}

/// A reply addressed to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    RunPump,
    ReadTemperature,
    ResetNutrientReminder,
    Status,
    Unrecognized(String),
}

impl Command {
    /// Exact match; no trimming or case folding.
    pub fn parse(text: &str) -> Self {
        match text {
            "/help" | "/start" => Self::Help,
            "/dutchrun" => Self::RunPump,
            "/dutchtemp" => Self::ReadTemperature,
            "/dutchnutrient" => Self::ResetNutrientReminder,
            "/dutchstatus" => Self::Status,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::RunPump => "run-pump",
            Self::ReadTemperature => "read-temperature",
            Self::ResetNutrientReminder => "reset-nutrient-reminder",
            Self::Status => "status",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

pub fn help_text(from_name: &str) -> String {
    let mut welcome = format!("Welcome, {from_name}.\n");
    welcome.push_str("Here are the following available commands\n\n");
    welcome.push_str("/dutchrun to manually run the pump for 1 minute\n");
    welcome.push_str("/dutchtemp to read water temps\n");
    welcome.push_str("/dutchnutrient to update nutrient reminder for 2 weeks\n");
    welcome.push_str("/dutchstatus to show pump, temperature and reminder status\n");
    welcome
}

pub fn restart_notice(start_counter: u32) -> String {
    format!("Dutch Bucket - Reset counter: {start_counter}")
}

// ===========================================================================
// Tests
// ===========================================================================
