use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use llama_inference::cli::Args;
use llama_inference::engine::system_info;
use llama_inference::input::{ConsoleReader, InputProvider, InteractiveInput};
use llama_inference::interject::{self, Interrupt};
use llama_inference::output::StdoutSink;
use llama_inference::prompting::infer_family_from_path;
use llama_inference::{config, inference};
use llama_inference::{CandleEngine, EngineOptions, InferenceEngine, Orchestrator, StopReason};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    let cfg = args.load_config().context("failed to build run configuration")?;
    cfg.validate()?;

    let params = cfg.generation_params();
    // candle's CPU kernels run on the global rayon pool.
    std::env::set_var("RAYON_NUM_THREADS", params.threads.to_string());

    info!(
        threads = params.threads,
        available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        "system_info: {}",
        system_info()
    );

    let model_path = cfg.model.clone().context("model path is required")?;
    let family = cfg.family.unwrap_or_else(|| infer_family_from_path(&model_path));
    let seed = config::resolve_seed(cfg.seed)?;
    info!(seed, "seed");

    let mut engine = CandleEngine::load(&EngineOptions {
        model_path,
        family,
        tokenizer_hint: cfg.tokenizer.clone(),
        tokenizer_repo: cfg.tokenizer_repo.clone(),
        context_size: cfg.ctx_size,
        seed,
    })?;

    let prompt = engine.tokenize(&cfg.prompt, true)?;
    let keep = inference::resolve_keep(params.keep, prompt.len());

    if cfg.verbose_prompt {
        info!(prompt = %cfg.prompt, tokens = prompt.len(), "verbose prompt");
        for token in &prompt {
            info!("{:6} -> '{}'", token, engine.detokenize(&[*token])?);
        }
        if keep > 0 {
            info!(n_keep = keep, "static prompt: '{}'", engine.detokenize(&prompt[..keep])?);
        }
    }

    let (handle, interjections, abort) = interject::channel();
    let interactive = cfg.is_interactive();

    let mut input = if interactive {
        ctrlc::set_handler(move || {
            if handle.interrupt() == Interrupt::Dropped {
                warn!("interrupt ignored, one is already pending");
            }
        })
        .context("failed to install the interrupt handler")?;

        info!("== Running in interactive mode. ==");
        info!(" - Press Ctrl+C to interject at any time.");
        info!(" - Press Return to return control to the model.");
        info!(" - If you want to submit another line, end your input in '\\'.");
        for reverse in &cfg.reverse_prompts {
            info!("reverse prompt: '{}'", reverse);
        }

        InputProvider::Interactive(InteractiveInput::new(
            cfg.reverse_prompts.clone(),
            ConsoleReader::stdin()?,
            abort,
        ))
    } else {
        InputProvider::PromptOnly
    };

    info!(
        arch = engine.architecture(),
        temp = params.sampling.temperature,
        top_k = params.sampling.top_k,
        top_p = params.sampling.top_p,
        repeat_last_n = params.sampling.repeat_last_n,
        repeat_penalty = params.sampling.repeat_penalty,
        "sampling parameters"
    );

    print!("{}", cfg.prompt);
    io::stdout().flush()?;

    let mut sink = StdoutSink::new();
    let outcome = Orchestrator::new(&mut engine, params).run(prompt, &mut input, &interjections, &mut sink)?;

    match outcome.stop {
        StopReason::EndOfSequence => println!(" [end of text]"),
        StopReason::PredictLimit => println!(),
        StopReason::Terminated => println!(),
    }

    info!(generated = outcome.generated, reason = ?outcome.stop, "done");
    outcome.stats.log_summary();
    Ok(())
}
