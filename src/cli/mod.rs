pub mod check;
pub mod replay;
pub mod run;

use anyhow::{Context, Result};

use cadence::Catalog;

use crate::ControlArgs;

// FOUR OPERATING POINTS: RATE DOUBLES, POWER ROUGHLY TRIPLES
const DEMO_CATALOG: &str = "\
# id  rate  power  knobs
0     0.5   10     cores=1 freq=low
1     1.0   25     cores=2 freq=low
2     2.0   70     cores=4 freq=mid
3     4.0   200    cores=8 freq=high
";

pub fn load_catalog(args: &ControlArgs) -> Result<Catalog> {
    match &args.catalog {
        Some(path) => Catalog::load(path),
        None => Catalog::parse(DEMO_CATALOG).context("built-in demo catalog"),
    }
}
