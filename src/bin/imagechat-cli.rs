// Terminal front end for an imagechat server

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use imagechat_lib::chat::{load_image_file, ChatSession, HttpExchangeClient, ImageSource};
use imagechat_lib::models::{Message, Role, APOLOGY_TEXT};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "imagechat-cli", about = "Ask questions about images through an imagechat server")]
struct Args {
    /// Base URL of the server
    #[arg(long, env = "IMAGECHAT_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Image to ask about (one-shot mode, needs --prompt)
    #[arg(long, requires = "prompt")]
    image: Option<PathBuf>,

    /// Question about the image (one-shot mode, needs --image)
    #[arg(long, requires = "image")]
    prompt: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Image(&'a str),
    Clear,
    Quit,
    Prompt(&'a str),
}

// Only an exact command word counts; `/imagery` is a prompt
fn parse_command(line: &str) -> Command<'_> {
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "/image" => Command::Image(rest),
        "/clear" => Command::Clear,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Prompt(line),
    }
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("you> {}", message.text),
        Role::Bot => println!("bot> {}\n", message.text),
    }
}

// A failed exchange settles as the apology; scripts need a non-zero exit for it
fn answer_text(reply: &Message) -> Result<&str> {
    if reply.text == APOLOGY_TEXT {
        anyhow::bail!("{}", APOLOGY_TEXT);
    }
    Ok(&reply.text)
}

async fn one_shot(client: &HttpExchangeClient, image: PathBuf, prompt: String) -> Result<()> {
    let mut session = ChatSession::new();
    session.stage_image(ImageSource::FilePicker, load_image_file(&image).await?);
    session.set_prompt(prompt);

    let reply = session
        .submit(client)
        .await
        .context("Prompt must not be blank")?;
    println!("{}", answer_text(reply)?);
    Ok(())
}

async fn interactive(client: &HttpExchangeClient) -> Result<()> {
    println!("Connected to {}", client.endpoint());
    println!("Commands: /image <path>, /clear, /quit. Anything else is sent as the prompt.\n");

    let mut session = ChatSession::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Command::Quit => break,
            Command::Clear => {
                session.clear_image();
                println!("(image cleared)");
            }
            Command::Image("") => println!("(usage: /image <path>)"),
            Command::Image(path) => {
                let path = PathBuf::from(path);
                let Some(ticket) = session.begin_image_load(ImageSource::FilePicker) else {
                    continue;
                };
                match load_image_file(&path).await {
                    Ok(image) => {
                        let name = image.file_name.clone();
                        if session.complete_image_load(ticket, image) {
                            println!("(staged {})", name);
                        }
                    }
                    Err(e) => eprintln!("{:#}", e),
                }
            }
            Command::Prompt(prompt) => {
                session.set_prompt(prompt);
                if session.staged_image().is_none() {
                    println!("(stage an image first with /image <path>)");
                    continue;
                }
                let before = session.messages().len();
                if session.submit(client).await.is_some() {
                    for message in &session.messages()[before..] {
                        print_message(message);
                    }
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let client = HttpExchangeClient::new(&args.server);

    match (args.image, args.prompt) {
        (Some(image), Some(prompt)) => one_shot(&client, image, prompt).await,
        _ => interactive(&client).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagechat_lib::models::MessageId;

    #[test]
    fn image_command_takes_path() {
        assert_eq!(parse_command("/image cookie.png"), Command::Image("cookie.png"));
        assert_eq!(parse_command("/image   /tmp/a b.png"), Command::Image("/tmp/a b.png"));
        assert_eq!(parse_command("/image"), Command::Image(""));
    }

    #[test]
    fn lookalike_words_are_prompts() {
        assert_eq!(parse_command("/imagery of cats"), Command::Prompt("/imagery of cats"));
        assert_eq!(parse_command("/clearly"), Command::Prompt("/clearly"));
    }

    #[test]
    fn apology_reply_is_an_error() {
        let failed = Message {
            id: MessageId(1),
            role: Role::Bot,
            text: APOLOGY_TEXT.to_string(),
            image: None,
        };
        assert!(answer_text(&failed).is_err());

        let answered = Message {
            text: "A red square.".to_string(),
            ..failed
        };
        assert_eq!(answer_text(&answered).unwrap(), "A red square.");
    }

    #[test]
    fn control_commands() {
        assert_eq!(parse_command("/clear"), Command::Clear);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("What is this?"), Command::Prompt("What is this?"));
    }
}
