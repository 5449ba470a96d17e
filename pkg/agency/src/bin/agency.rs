#[macro_use]
extern crate macros;

use common::args::parse_args;
use common::async_std::task::block_on;
use common::errors::*;

use agency::Config;

fn main() -> Result<()> {
    let config = parse_args::<Config>()?;
    block_on(agency::run(&config))
}
