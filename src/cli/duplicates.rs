use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{DuplicateOptions, Opts, ServiceOptions};
use crate::{CollectionId, DuplicatePair};

#[derive(Parser, Debug, Clone)]
pub struct DuplicatesCommand {
    #[command(flatten)]
    pub service: ServiceOptions,
    #[command(flatten)]
    pub duplicate: DuplicateOptions,
    /// 集合 ID
    pub id: CollectionId,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for DuplicatesCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let service = self.service.open(opts)?;
        let pairs = block_in_place(|| service.find_duplicates(self.id, self.duplicate.threshold))?;
        print_result(&pairs, self.output_format)
    }
}

fn print_result(result: &[DuplicatePair], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for pair in result {
                println!("{}\t{}\t{:.4}", pair.first_image_id, pair.second_image_id, pair.similarity);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
