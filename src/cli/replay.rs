use anyhow::Result;

use cadence::replay;

use crate::ReplayArgs;

pub fn run_replay(args: &ReplayArgs) -> Result<()> {
    let records = replay::load(&args.path)?;

    if args.dump {
        for r in &records {
            println!("{}", r);
        }
        println!();
    }

    let timeline = replay::timeline(&records);
    println!("ACTIVE-STATE TIMELINE ({})", args.path.display());
    println!("{:<12} {}", "SEQ", "STATE");
    println!("{}", "-".repeat(24));
    for (seq, state) in &timeline {
        println!("{:<12} {}", seq, state);
    }
    println!("{}", "-".repeat(24));

    let c = replay::counts(&records);
    println!("  RECORDS:           {}", records.len());
    println!("  BEATS:             {}", c.beats);
    println!("  TRANSITIONS:       {}", c.transitions);
    println!("  APPLY FAILURES:    {}", c.failures);
    println!("  MEASUREMENT GAPS:  {}", c.gaps);
    match replay::final_state(&records) {
        Some(s) => println!("  FINAL STATE:       {}", s),
        None => println!("  FINAL STATE:       (no SHUTDOWN record, run did not finish)"),
    }
    Ok(())
}
