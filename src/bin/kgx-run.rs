use clap::Parser;
use kmergrid::{RouteConfig, route_kmers, run_grid};
use std::path::PathBuf;

/// Route canonical k-mers across a rank grid from an indexed FASTA.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input FASTA path (expects `<input>.fai` alongside)
    #[arg(short, long)]
    input: PathBuf,

    /// K-mer length (<= 32)
    #[arg(short = 'k', long)]
    k: usize,

    /// Number of ranks
    #[arg(short = 'r', long, default_value_t = 1)]
    ranks: usize,

    /// Sketch precision (register count = 2^p)
    #[arg(long, default_value_t = 12)]
    hll_precision: u8,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let cfg = RouteConfig::new(args.k).with_hll_precision(args.hll_precision);
    let results = run_grid(args.ranks, |grid| route_kmers(&args.input, &cfg, &grid));

    let mut total = 0usize;
    for (rank, result) in results.into_iter().enumerate() {
        let map = result?;
        eprintln!(
            "rank {rank} owns {} distinct canonical {}-mers",
            map.len(),
            args.k
        );
        total += map.len();
    }
    eprintln!("[kgx] {total} distinct canonical k-mers across {} ranks", args.ranks);

    Ok(())
}
