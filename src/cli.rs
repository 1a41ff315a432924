use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::info;
use std::fs;
use std::path::PathBuf;

use crate::config::{ClassifierConfig, ServerConfig};
use crate::handlers::{self, AppState};
use crate::models::Analysis;
use crate::preprocess::Upload;
use crate::report;

#[derive(Debug, Parser)]
#[command(name = "fish-analyzer", version, about = "Identify fish species in photographs")]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
}

impl Arguments {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve(serve) => serve.run().await,
            Command::Predict(predict) => predict.run().await,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP prediction API
    Serve(Serve),
    /// Classify a single image file
    Predict(Predict),
}

#[derive(Debug, Args)]
struct Serve {
    #[command(flatten)]
    classifier: ClassifierConfig,
    #[command(flatten)]
    server: ServerConfig,
}

impl Serve {
    async fn run(self) -> anyhow::Result<()> {
        let backend = self
            .classifier
            .load_backend()
            .context("failed to load classifier")?;
        info!("Using {} backend", backend.name());

        let state = web::Data::new(AppState {
            backend,
            max_upload_bytes: self.server.max_upload_bytes,
        });

        let server_config = self.server.clone();
        let mut server = HttpServer::new(move || {
            App::new()
                .wrap(Logger::default())
                .wrap(server_config.cors())
                .app_data(state.clone())
                .configure(handlers::configure)
                .default_service(web::route().to(handlers::not_found))
        });
        if let Some(workers) = self.server.workers {
            server = server.workers(workers);
        }

        info!(
            "Server running at http://{}:{}",
            self.server.host, self.server.port
        );
        server
            .bind((self.server.host.as_str(), self.server.port))
            .with_context(|| format!("failed to bind {}:{}", self.server.host, self.server.port))?
            .run()
            .await?;

        Ok(())
    }
}

#[derive(Debug, Args)]
struct Predict {
    /// JPEG or PNG image to classify
    image: PathBuf,

    /// Print the analysis as JSON instead of a text report
    #[arg(long)]
    json: bool,

    /// Also write the text report to this file
    #[arg(long)]
    save: Option<PathBuf>,

    #[command(flatten)]
    classifier: ClassifierConfig,
}

impl Predict {
    async fn run(self) -> anyhow::Result<()> {
        let backend = self
            .classifier
            .load_backend()
            .context("failed to load classifier")?;

        let bytes = fs::read(&self.image)
            .with_context(|| format!("failed to read {}", self.image.display()))?;
        let file_name = self
            .image
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        let upload = Upload::decode_blocking(bytes, file_name)
            .await
            .with_context(|| format!("failed to decode {}", self.image.display()))?;
        let prediction = backend.classify(&upload).await?;
        let analysis = Analysis::new(&upload, backend.name(), prediction);
        let text = report::render(&analysis);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        } else {
            print!("{}", text);
        }

        if let Some(path) = &self.save {
            fs::write(path, &text)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }

        Ok(())
    }
}
