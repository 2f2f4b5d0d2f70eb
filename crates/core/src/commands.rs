use serde::{Deserialize, Serialize};

/// Cover commands accepted from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CoverCommand {
    Open,
    Close,
    Stop,
    SetPosition(i32), // 0 closed ..= 100 open, not range-checked
}

impl CoverCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CoverCommand::Open => "open",
            CoverCommand::Close => "close",
            CoverCommand::Stop => "stop",
            CoverCommand::SetPosition(_) => "set_position",
        }
    }
}
