pub mod bot_state;
pub mod keybinds;
pub mod path;
pub mod settings;
