use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

/// Prints the release line, plus build provenance with `--extended`.
/// Environment and protocol constants live under `envinfo`.
pub fn run(args: VersionArgs) -> CliResult<i32> {
    for line in version_lines(args.extended) {
        println!("{line}");
    }
    Ok(SUCCESS)
}

fn version_lines(extended: bool) -> Vec<String> {
    let mut lines = vec![format!("pipebus {}", env!("CARGO_PKG_VERSION"))];
    if extended {
        lines.push(format!(
            "built for {} from {}",
            option_env!("PIPEBUS_BUILD_TARGET").unwrap_or("unknown-target"),
            option_env!("GIT_HASH").unwrap_or("an untagged tree"),
        ));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_is_one_release_line() {
        let lines = version_lines(false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("pipebus "));
    }

    #[test]
    fn extended_output_adds_provenance() {
        let lines = version_lines(true);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("built for "));
    }
}
