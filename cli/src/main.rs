mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::ClientCli;
use joblib::JobStatus;

use clap::Parser;
use std::{error, process, time::Duration};
use tokio::io::AsyncReadExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let client = ClientCli::connect(&args.server);

    match args.sub_command {
        SubCommand::Submit {
            mime_type,
            webhook,
            input,
            args,
        } => {
            let input = match input {
                Some(path) if path.as_os_str() == "-" => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    Some(buf)
                }
                Some(path) => Some(tokio::fs::read(path).await?),
                None => None,
            };
            client.submit(args, mime_type, webhook, input).await?;
        }
        SubCommand::List => {
            client.list().await?;
        }
        SubCommand::Status { job_id } => {
            client.print_status(job_id).await?;
        }
        SubCommand::JobResult { job_id } => {
            client.print_result(job_id).await?;
        }
        SubCommand::Log { job_id } => {
            client.print_log(job_id).await?;
        }
        SubCommand::Cancel { job_id } => {
            client.cancel(job_id).await?;
        }
        SubCommand::Wait {
            job_id,
            interval_ms,
        } => {
            let status = client
                .wait(job_id, Duration::from_millis(interval_ms))
                .await?;
            if status != JobStatus::Completed {
                process::exit(1);
            }
        }
    }

    Ok(())
}
