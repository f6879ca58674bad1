use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("rnsnow {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: rnsnow");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RNSNOW_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: link={}, async={}, serial={}, cli=true",
        cfg!(feature = "link"),
        cfg!(feature = "async"),
        cfg!(feature = "serial")
    );
    println!(
        "radio: mtu={} header={} fragment_payload={}",
        rnsnow_link::MAX_PACKET_SIZE,
        rnsnow_link::HEADER_SIZE,
        rnsnow_link::MAX_FRAGMENT_PAYLOAD
    );

    Ok(SUCCESS)
}
