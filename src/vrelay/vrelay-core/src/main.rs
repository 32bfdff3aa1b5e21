/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/
use anyhow::Context;
use vrelay::{Args, Commands};

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = <Args as clap::Parser>::parse();
    let config = args.to_config().context("Invalid arguments")?;

    match args.command {
        Some(Commands::ConfigShow) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        Some(Commands::ConfigDiff) => {
            print!("{}", vrelay::config_diff(&config)?);
            return Ok(());
        }
        None => {}
    }

    vrelay::init_logs(&config)?;

    vrelay_server::start_runtime(config)
}
