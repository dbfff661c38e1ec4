pub mod commands;
pub mod globalsettings;
pub mod lastrun;
pub mod output;
