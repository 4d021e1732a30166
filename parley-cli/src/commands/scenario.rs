use anyhow::Result;
use clap::Args;
use parley_core::{ScenarioGenerator, SeedContent};

use crate::config::ConfigLoader;

#[derive(Args)]
pub struct ScenarioArgs {
    /// Title of the source content
    #[arg(long)]
    pub title: String,

    /// Short summary of the source content
    #[arg(long, default_value = "")]
    pub summary: String,

    /// Topic tags (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Generate locally without calling the provider
    #[arg(long)]
    pub offline: bool,
}

pub async fn run(args: ScenarioArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let generator = super::generator(&config.provider, args.offline);

    let seed = SeedContent::new(args.title, args.summary).with_tags(args.tags);
    let scenario = ScenarioGenerator::new(generator, &config.engine)
        .generate(&seed)
        .await?;

    println!("{}", serde_json::to_string_pretty(&scenario)?);
    Ok(())
}
