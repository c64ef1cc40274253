use http_gauntlet_runner::prelude::{init, run, GauntletResult};
use ticket_purchase::definition;

fn main() -> GauntletResult<()> {
    run(definition(init()))?;

    Ok(())
}
