use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use slu_data::{Corpus, IntentSlotDataset, Segment, SlotStats};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "fetch_datasets",
    about = "Download, verify and summarise the ATIS and SNIPS datasets"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = CorpusFlag::All, help = "Corpus to fetch")]
    corpus: CorpusFlag,

    #[arg(
        long,
        help = "Dataset root (parent directory when fetching all corpora)"
    )]
    root: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CorpusFlag {
    Atis,
    Snips,
    All,
}

impl CorpusFlag {
    fn corpora(self) -> Vec<Corpus> {
        match self {
            CorpusFlag::Atis => vec![Corpus::Atis],
            CorpusFlag::Snips => vec![Corpus::Snips],
            CorpusFlag::All => Corpus::ALL.to_vec(),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(err) = run() {
        eprintln!("fetch failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> slu_data::Result<()> {
    let args = Args::parse();
    let corpora = args.corpus.corpora();
    let shared_root = corpora.len() > 1;

    for corpus in corpora {
        let root = args.root.as_ref().map(|root| {
            if shared_root {
                root.join(corpus.name())
            } else {
                root.clone()
            }
        });
        let mut segments = Vec::with_capacity(Segment::ALL.len());
        for segment in Segment::ALL {
            segments.push(IntentSlotDataset::new(corpus, segment, root.clone())?);
        }

        let train = &segments[0];
        let intent_vocab = train.intent_vocab()?;
        let slot_vocab = train.slot_vocab()?;
        let stats = SlotStats::collect(slot_vocab, &segments)?;

        println!("{} ({})", corpus, train.root().display());
        for dataset in &segments {
            println!("  {:<5} {:>6} records", dataset.segment(), dataset.len());
        }
        println!("  intents     {}", intent_vocab.len());
        println!(
            "  slot tags   {} ({} types)",
            slot_vocab.len(),
            slot_vocab.slot_types().len()
        );
        let unseen = stats.unseen();
        if !unseen.is_empty() {
            println!("  unseen slot ids: {:?}", unseen);
        }
    }

    Ok(())
}
