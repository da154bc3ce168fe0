// ABOUTME: Port argument parsing for `--ports`
// ABOUTME: `N` publishes N on both sides, `H:C` maps host port H to container port C

use sndbx_sandbox::PortPair;

pub fn parse_port(value: &str) -> Result<PortPair, String> {
    let parse = |raw: &str| {
        raw.trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| format!("invalid port '{}', expected 1-65535", raw.trim()))
    };

    match value.split_once(':') {
        Some((host, container)) => Ok(PortPair {
            host: parse(host)?,
            container: parse(container)?,
        }),
        None => parse(value).map(PortPair::same),
    }
}
