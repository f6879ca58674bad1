use crate::cmd::{ConfigArgs, Context};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

pub fn run(args: ConfigArgs, ctx: Context) -> CliResult<i32> {
    // Loading already validated the file.
    if args.check {
        return Ok(SUCCESS);
    }

    match ctx.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ctx.config).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            if let Some(path) = &ctx.config_path {
                println!("source: {}", path.display());
            }
            print_record("serial", &ctx.config.serial, ctx.format);
            print_record("radio", &ctx.config.radio, ctx.format);
            print_record("link", &ctx.config.link, ctx.format);
            print_record("discovery", &ctx.config.link.discovery, ctx.format);
        }
    }
    Ok(SUCCESS)
}
