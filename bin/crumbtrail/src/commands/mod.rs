pub mod doctor;
pub mod ledger_cmd;
pub mod replay_cmd;
pub mod run_cmd;
