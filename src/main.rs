use aidraw::ai::FnCallbacks;
use aidraw::app::App;
use aidraw::image::{mime::sniff_media_type, InlineImage};
use aidraw::models::{
    AspectRatio, BackendFamily, Config, CustomModel, CustomModelUpdate, GenerationRequest,
    ImageSize, ModelTag, Quality, SafetyTolerance, VideoDuration,
};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "aidraw")]
#[command(about = "Generate images and videos with FAL or OpenAI-compatible gateways")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one generation and print the resulting asset URL(s).
    Generate(GenerateArgs),
    /// Manage the stored API credential.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect or prune generation history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage the model catalog.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    /// Catalog id or backend model identifier. Defaults to the first catalog entry.
    #[arg(long)]
    model: Option<String>,
    /// Source image file; repeat for up to four references.
    #[arg(long = "image", value_name = "FILE")]
    images: Vec<PathBuf>,
    #[arg(long, value_name = "FILE")]
    mask: Option<PathBuf>,
    #[arg(long, default_value = "1:1")]
    aspect_ratio: AspectRatio,
    #[arg(short, default_value_t = 1)]
    n: u8,
    #[arg(long, default_value = "auto")]
    quality: Quality,
    /// Output size for masked edits, e.g. 1024x1024.
    #[arg(long)]
    size: Option<ImageSize>,
    #[arg(long)]
    no_safety_checker: bool,
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=6))]
    safety_tolerance: u8,
    #[arg(long, default_value = "5")]
    duration: VideoDuration,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Set {
        #[arg(long)]
        key: String,
        #[arg(long, default_value = "")]
        base_url: String,
    },
    Show,
    Clear,
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    List,
    Clear,
    Remove { id: String },
}

#[derive(Debug, Subcommand)]
enum ModelsAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        /// Identifier sent to the backend.
        #[arg(long)]
        value: String,
        #[arg(long = "type", value_name = "fal|openai")]
        model_type: BackendFamily,
        #[arg(long)]
        tag: Option<ModelTag>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        value: Option<String>,
        #[arg(long = "type", value_name = "fal|openai")]
        model_type: Option<BackendFamily>,
        #[arg(long, conflicts_with = "clear_tag")]
        tag: Option<ModelTag>,
        #[arg(long)]
        clear_tag: bool,
    },
    Remove {
        id: String,
    },
}

fn read_image(path: &Path) -> Result<InlineImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(InlineImage::from_bytes(&bytes, sniff_media_type(&bytes)))
}

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    if key.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

fn build_request(app: &App, args: GenerateArgs) -> Result<GenerationRequest> {
    let models = app.storage().get_custom_models()?;
    let model = match &args.model {
        Some(id) => app
            .storage()
            .find_model(id)?
            .with_context(|| format!("Unknown model '{}'; see `aidraw models list`", id))?,
        None => models.into_iter().next().context("Model catalog is empty")?,
    };

    let images = args
        .images
        .iter()
        .map(|path| read_image(path))
        .collect::<Result<Vec<_>>>()?;

    let mut request = GenerationRequest::for_model(args.prompt, &model)
        .with_source_images(images)
        .with_aspect_ratio(args.aspect_ratio)
        .with_count(args.n)
        .with_quality(args.quality)
        .with_size(args.size)
        .with_safety_checker(!args.no_safety_checker)
        .with_safety_tolerance(SafetyTolerance::new(args.safety_tolerance)?)
        .with_duration(args.duration);
    if let Some(mask) = &args.mask {
        request = request.with_mask(read_image(mask)?);
    }
    Ok(request)
}

async fn run_generate(app: &App, args: GenerateArgs) -> Result<()> {
    let request = build_request(app, args)?;

    let failure = Arc::new(Mutex::new(None::<String>));
    let failure_sink = failure.clone();
    let mut callbacks = FnCallbacks::new(
        |delta| {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        },
        |_url| println!(),
        move |err| {
            if let Ok(mut slot) = failure_sink.lock() {
                *slot = Some(err.to_string());
            }
        },
    );

    let urls = app.generate(&request, &mut callbacks).await?;
    if urls.is_empty() {
        let message = failure
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "Generation produced no asset".to_string());
        anyhow::bail!(message);
    }

    for url in urls {
        println!("{}", url);
    }
    Ok(())
}

fn run_config(app: &App, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, base_url } => {
            app.storage().set_api_config(&key, &base_url)?;
            app.storage().upgrade_base_url_to_https()?;
            info!("Stored API credential");
        }
        ConfigAction::Show => match app.storage().get_api_config()? {
            Some(config) => {
                println!("key:       {}", mask_key(&config.key));
                println!("base url:  {}", config.base_url);
                println!("created:   {}", config.created_at);
                if let Some(last_used) = config.last_used {
                    println!("last used: {}", last_used);
                }
            }
            None => println!("No API credential stored"),
        },
        ConfigAction::Clear => app.storage().remove_api_config()?,
    }
    Ok(())
}

fn run_history(app: &App, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List => {
            for image in app.storage().get_history()? {
                println!(
                    "{}  {}  {}  [{}]  {}\n    {}",
                    image.created_at, image.id, image.model, image.aspect_ratio, image.prompt, image.url
                );
            }
        }
        HistoryAction::Clear => app.storage().clear_history()?,
        HistoryAction::Remove { id } => app.storage().remove_from_history(&id)?,
    }
    Ok(())
}

fn run_models(app: &App, action: ModelsAction) -> Result<()> {
    match action {
        ModelsAction::List => {
            for model in app.storage().get_custom_models()? {
                println!(
                    "{:<28} {:<24} {:<7} {:<15} {}",
                    model.id,
                    model.name,
                    model.model_type.to_string(),
                    model.tag.map(ModelTag::label).unwrap_or("-"),
                    model.value
                );
            }
        }
        ModelsAction::Add {
            name,
            value,
            model_type,
            tag,
        } => {
            let id = Uuid::new_v4().to_string();
            app.storage().add_custom_model(CustomModel {
                id: id.clone(),
                name,
                value,
                model_type,
                tag,
                created_at: Utc::now().to_rfc3339(),
                is_default: None,
            })?;
            println!("{}", id);
        }
        ModelsAction::Update {
            id,
            name,
            value,
            model_type,
            tag,
            clear_tag,
        } => {
            let update = CustomModelUpdate {
                name,
                value,
                model_type,
                tag: if clear_tag { Some(None) } else { tag.map(Some) },
            };
            if !app.storage().update_custom_model(&id, &update)? {
                anyhow::bail!("No user model with id '{}'", id);
            }
        }
        ModelsAction::Remove { id } => app.storage().remove_custom_model(&id)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aidraw=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    let config = Config::from_env()?;
    let app = match App::new(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if app.storage().upgrade_base_url_to_https()? {
        info!("Stored base URL switched to https");
    }

    let outcome = match args.command {
        Command::Generate(generate) => run_generate(&app, generate).await,
        Command::Config { action } => run_config(&app, action),
        Command::History { action } => run_history(&app, action),
        Command::Models { action } => run_models(&app, action),
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_generate_flags() {
        let args = CliArgs::try_parse_from([
            "aidraw",
            "generate",
            "--prompt",
            "a cat",
            "--image",
            "a.png",
            "--image",
            "b.png",
            "--aspect-ratio",
            "16:9",
            "-n",
            "2",
            "--duration",
            "10",
            "--size",
            "1536x1024",
        ])
        .unwrap();

        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.prompt, "a cat");
        assert_eq!(generate.images.len(), 2);
        assert_eq!(generate.aspect_ratio, AspectRatio::Landscape16x9);
        assert_eq!(generate.n, 2);
        assert_eq!(generate.duration, VideoDuration::Ten);
        assert_eq!(generate.size, Some(ImageSize::Landscape1536));
        assert_eq!(generate.safety_tolerance, 2);
        assert!(!generate.no_safety_checker);
    }

    #[test]
    fn test_cli_rejects_out_of_range_tolerance() {
        let result = CliArgs::try_parse_from([
            "aidraw",
            "generate",
            "--prompt",
            "a cat",
            "--safety-tolerance",
            "7",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_model_add() {
        let args = CliArgs::try_parse_from([
            "aidraw",
            "models",
            "add",
            "--name",
            "Kontext",
            "--value",
            "fal-ai/flux-pro/kontext",
            "--type",
            "fal",
            "--tag",
            "image-to-image",
        ])
        .unwrap();

        let Command::Models {
            action: ModelsAction::Add { model_type, tag, .. },
        } = args.command
        else {
            panic!("expected models add");
        };
        assert_eq!(model_type, BackendFamily::Fal);
        assert_eq!(tag, Some(ModelTag::ImageToImage));
    }

    #[test]
    fn test_mask_key_hides_secret() {
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("sk-abcdefghijkl"), "sk-a****");
    }
}
