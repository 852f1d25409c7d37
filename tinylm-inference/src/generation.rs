use crate::engine::InferenceEngine;
use crate::worker::EngineWorker;
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::time::Instant;

/// Generates a continuation of `prompt` and streams it to stdout.
pub fn generate(engine: &InferenceEngine, prompt: Option<&str>, max_tokens: usize, temperature: f32) -> Result<()> {
    let prompt = prompt.unwrap_or("");

    let mut stdout = io::stdout().lock();
    stdout.write_all(prompt.as_bytes())?;
    stdout.flush()?;

    let mut metrics = TokenMetrics::new();
    let mut write_error = None;

    metrics.start_generation();
    engine.generate_with(prompt, max_tokens, temperature, |byte| {
        metrics.increment_token();
        if write_error.is_none() {
            let mut encoded = [0u8; 4];
            let text = char::from(byte).encode_utf8(&mut encoded);
            if let Err(err) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
                write_error = Some(err);
            }
        }
    })?;

    if let Some(err) = write_error {
        return Err(err).context("Failed to write generated text");
    }

    drop(stdout);
    metrics.report_and_reset();
    println!();
    Ok(())
}

/// Interactive loop: each line read from stdin is sent to the worker and the
/// continuation printed once it arrives. An empty line ends the session.
pub fn chat(worker: &EngineWorker, prompt: Option<&str>, max_tokens: usize, temperature: f32) -> Result<()> {
    let stdin = io::stdin();
    let mut first_turn = true;

    loop {
        let user_prompt = get_user_input(&stdin, first_turn, prompt)?;
        first_turn = false;

        if user_prompt.is_empty() {
            break;
        }

        let mut metrics = TokenMetrics::new();
        metrics.start_generation();

        let reply = worker.submit_generate(&user_prompt, max_tokens, temperature)?;
        let response = reply.recv().context("Engine worker stopped before replying")??;

        metrics.add_tokens(max_tokens);
        // The response repeats the prompt; only show the continuation.
        let continuation = response.strip_prefix(user_prompt.as_str()).unwrap_or(&response);
        print!("{continuation}");
        io::stdout().flush()?;
        metrics.report_and_reset();
        println!();
    }

    Ok(())
}

fn get_user_input(stdin: &io::Stdin, first_turn: bool, cli_prompt: Option<&str>) -> Result<String> {
    match (first_turn, cli_prompt) {
        (true, Some(prompt)) if !prompt.is_empty() => Ok(prompt.to_string()),
        _ => {
            print!("> ");
            io::stdout().flush()?;
            let mut input = String::new();
            stdin.read_line(&mut input)?;
            Ok(input.trim().to_string())
        }
    }
}

/// Tracks token generation performance metrics
struct TokenMetrics {
    start_time: Option<Instant>,
    generated_count: usize,
}

impl TokenMetrics {
    fn new() -> Self {
        Self { start_time: None, generated_count: 0 }
    }

    fn start_generation(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
    }

    fn increment_token(&mut self) {
        self.generated_count += 1;
    }

    fn add_tokens(&mut self, count: usize) {
        self.generated_count += count;
    }

    fn report_and_reset(&mut self) {
        if let Some(start_time) = self.start_time.take() {
            let duration = start_time.elapsed();
            if self.generated_count > 0 && duration.as_secs_f64() > 0.0 {
                let tps = self.generated_count as f64 / duration.as_secs_f64();
                println!(
                    "\n[Generated {} tokens in {:.2}s - {:.2} tokens/sec]",
                    self.generated_count,
                    duration.as_secs_f64(),
                    tps
                );
            }
        }
        self.generated_count = 0;
    }
}
