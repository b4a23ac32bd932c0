use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = modsim::cli::parse_args();
    modsim::boot::init_logger(matches.get_one::<String>("log-file").map(String::as_str));

    if let Err(err) = modsim::cli::actions::run(&matches).await {
        log::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}
