use std::io::{self, Write};
use std::time::Duration;
use rustyline::{
    Config as RustyConfig, Editor, error::ReadlineError,
    completion::{Completer, Pair, FilenameCompleter},
    hint::{Hinter, HistoryHinter},
    highlight::{Highlighter, MatchingBracketHighlighter, CmdKind},
    validate::{ValidationContext, ValidationResult, Validator},
    Helper, history::FileHistory
};
use colored::Colorize;
use log::{debug, error, warn};
use crate::{
    client::{ChatBackend, HttpChatClient},
    config::Config,
    message::{Message, Role},
    render::MarkdownRenderer,
    reveal::Reveal,
    session::{Command, Outcome, Session},
    storage::{FileStorage, KeyValueStorage, MemoryStorage},
    store::ConversationStore,
};

const SLASH_COMMANDS: &[&str] = &["/new", "/clear-history", "/history", "/export", "/help", "/exit"];
const TYPING_INDICATOR: &str = "• • •";

struct ChatHelper {
    filename_completer: FilenameCompleter,
    hinter: HistoryHinter,
    bracket_highlighter: MatchingBracketHighlighter,
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if line.starts_with("/export ") {
            return self.filename_completer.complete(line, pos, ctx);
        }
        if !line.starts_with('/') || line[..pos].contains(' ') {
            return Ok((pos, Vec::new()));
        }

        let word = &line[..pos];
        let candidates = SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &rustyline::Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> std::borrow::Cow<'h, str> {
        std::borrow::Cow::Owned(hint.truecolor(128, 128, 128).to_string())
    }

    fn highlight<'l>(&self, line: &'l str, pos: usize) -> std::borrow::Cow<'l, str> {
        self.bracket_highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize, forced: CmdKind) -> bool {
        self.bracket_highlighter.highlight_char(line, pos, forced)
    }
}

impl Validator for ChatHelper {
    // A trailing backslash keeps the input open, the terminal's Shift+Enter.
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        if ctx.input().ends_with('\\') {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

/// Removes the continuation backslashes, keeping the line breaks.
pub fn join_continuations(input: &str) -> String {
    input.replace("\\\n", "\n")
}

pub fn run_cli(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let storage = open_storage(&config);
    let store = ConversationStore::load(storage);
    let client = HttpChatClient::new(&config)?;
    let mut session = Session::new(store, client);
    let renderer = MarkdownRenderer::new();

    let rusty_config = RustyConfig::builder()
        .completion_type(rustyline::CompletionType::List)
        .auto_add_history(false)
        .build();

    let mut rl: Editor<ChatHelper, FileHistory> = Editor::with_config(rusty_config)?;
    rl.set_helper(Some(ChatHelper {
        filename_completer: FilenameCompleter::new(),
        hinter: HistoryHinter {},
        bracket_highlighter: MatchingBracketHighlighter::new(),
    }));
    load_editor_history(&mut rl, session.store().history())?;

    println!("{}", format!("mdchat v{} · {}", env!("CARGO_PKG_VERSION"), config.api_addr).blue());
    println!("{}", "Type /help for commands.".truecolor(128, 128, 128));
    for message in session.store().messages() {
        print_message(&config, &renderer, message);
    }

    loop {
        match rl.readline(&"you> ".green()) {
            Ok(line) => {
                let text = join_continuations(&line);
                let trimmed = text.trim();
                match trimmed {
                    "" => continue,
                    "/exit" => break,
                    "/help" => println!(
                        "{}",
                        "Workflow:\n\
                        - Type a message and press Enter to send it\n\
                        - End a line with \\ to continue on the next line\n\
                        \n\
                        Available commands:\n\
                        - /new: Start a new conversation (clears local and server state)\n\
                        - /clear-history: Forget previous inputs\n\
                        - /history: Show previous inputs\n\
                        - /export <path>: Write the conversation as an HTML page\n\
                        - /exit: Exit the program\n\
                        - /help: Show this help message\n"
                            .blue()
                    ),
                    "/new" => {
                        dispatch(&mut session, Command::NewConversation);
                        rl.clear_history()?;
                        println!("{}", "Started a new conversation.".yellow());
                    }
                    "/clear-history" => {
                        dispatch(&mut session, Command::ClearHistory);
                        rl.clear_history()?;
                        println!("{}", "Input history cleared.".yellow());
                    }
                    "/history" => {
                        let history = session.store().history();
                        if history.is_empty() {
                            println!("{}", "No previous inputs yet.".truecolor(128, 128, 128));
                        }
                        for (i, entry) in history.iter().enumerate() {
                            println!("{} {}", format!("[{}]", i + 1).yellow(), entry);
                        }
                    }
                    input if input.starts_with("/export") => {
                        let path = input["/export".len()..].trim();
                        if path.is_empty() {
                            println!("{}", "Usage: /export <path>".red());
                            continue;
                        }
                        let page = renderer.render_transcript(session.store().messages(), config.markdown);
                        match std::fs::write(path, page) {
                            Ok(()) => println!("{}", format!("Conversation written to '{}'", path).green()),
                            Err(e) => println!("{}", format!("Failed to write '{}': {}", path, e).red()),
                        }
                    }
                    _ => {
                        print!("{}", TYPING_INDICATOR.truecolor(128, 128, 128));
                        io::stdout().flush()?;
                        let outcome = dispatch(&mut session, Command::Send(text.clone()));
                        print!("\r\x1b[2K");
                        io::stdout().flush()?;

                        match outcome {
                            Some(Outcome::Replied(reply)) => {
                                rl.add_history_entry(text.as_str())?;
                                show_reply(&config, &renderer, &session, &reply)?;
                            }
                            Some(Outcome::Failed(reply)) => println!("{}", reply.content.red()),
                            _ => {}
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(Box::new(e)),
        }
    }

    println!("{}", "Goodbye!".blue());
    Ok(())
}

/// Falls back to volatile storage so an unusable storage path never stops the chat.
pub fn open_storage(config: &Config) -> Box<dyn KeyValueStorage> {
    let path = config.storage_path();
    match FileStorage::open(&path) {
        Ok(storage) => {
            debug!("Conversation stored in '{}'", storage.path().display());
            Box::new(storage)
        }
        Err(e) => {
            warn!("{}", e);
            println!(
                "{}",
                format!("Cannot use storage '{}': {}. This conversation will not be saved.", path.display(), e).red()
            );
            Box::new(MemoryStorage::new())
        }
    }
}

/// Storage failures are reported and the loop carries on.
fn dispatch<S: KeyValueStorage, B: ChatBackend>(session: &mut Session<S, B>, command: Command) -> Option<Outcome> {
    match session.handle(command) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!("{}", e);
            println!("{}", format!("Failed to save conversation: {}", e).red());
            None
        }
    }
}

fn load_editor_history(rl: &mut Editor<ChatHelper, FileHistory>, history: &[String]) -> rustyline::Result<()> {
    for entry in history.iter().rev() {
        rl.add_history_entry(entry.as_str())?;
    }
    Ok(())
}

fn render_for_terminal(config: &Config, renderer: &MarkdownRenderer, message: &Message) -> String {
    if config.markdown {
        renderer.render_terminal(&message.content)
    } else {
        message.content.chars().filter(|c| !c.is_control() || *c == '\n').collect()
    }
}

fn print_message(config: &Config, renderer: &MarkdownRenderer, message: &Message) {
    match message.role {
        Role::User => println!("{} {}", "you>".green(), render_for_terminal(config, renderer, message)),
        Role::Bot => println!("{}\n{}", "bot>".cyan(), render_for_terminal(config, renderer, message)),
    }
}

fn show_reply<S: KeyValueStorage, B: ChatBackend>(
    config: &Config,
    renderer: &MarkdownRenderer,
    session: &Session<S, B>,
    reply: &Message,
) -> io::Result<()> {
    if !config.progressive_reveal {
        print_message(config, renderer, reply);
        return Ok(());
    }

    println!("{}", "bot>".cyan());
    let reveal = Reveal::new(Duration::from_millis(config.reveal_interval_ms), session.store().epoch());
    let mut stdout = io::stdout();
    reveal.run(&render_for_terminal(config, renderer, reply), &mut stdout)?;
    writeln!(stdout)
}
