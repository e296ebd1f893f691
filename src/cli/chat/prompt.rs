use rustyline::{Config, Editor, Result};

pub fn generate_prompt(turns: usize) -> String {
    if turns == 0 {
        "> ".to_string()
    } else {
        format!("[{}] > ", turns)
    }
}

pub fn rl() -> Result<Editor<()>> {
    let config = Config::builder()
        .history_ignore_space(true)
        .build();
    Editor::with_config(config)
}
