//! `client-info`/`client`: a thin `reqwest`-based terminal view onto a
//! running instance's HTTP control plane.

use mflow_core::Config;

use crate::pidfile::CliError;

fn base_url(config: &Config) -> String {
    let host = if config.rest_host == "0.0.0.0" { "127.0.0.1" } else { &config.rest_host };
    format!("http://{host}:{}/api/v1/{}", config.rest_port, config.instance_name)
}

async fn get_json(client: &reqwest::Client, url: &str) -> Result<serde_json::Value, CliError> {
    client
        .get(url)
        .send()
        .await
        .map_err(|e| CliError(format!("GET {url}: {e}")))?
        .json::<serde_json::Value>()
        .await
        .map_err(|e| CliError(format!("parsing response from {url}: {e}")))
}

/// Prints `help` and `status`, the quick-glance view.
pub async fn client_info(config: &Config) -> Result<(), CliError> {
    let client = reqwest::Client::new();
    let base = base_url(config);

    let help = get_json(&client, &format!("{base}/help")).await?;
    println!("help: {}", serde_json::to_string_pretty(&help).unwrap());

    let status = get_json(&client, &format!("{base}/status")).await?;
    println!("status: {}", serde_json::to_string_pretty(&status).unwrap());
    Ok(())
}

/// Prints `status`, `parameters`, and `statistics`, the full view.
pub async fn client(config: &Config) -> Result<(), CliError> {
    let client = reqwest::Client::new();
    let base = base_url(config);

    let status = get_json(&client, &format!("{base}/status")).await?;
    println!("status: {}", serde_json::to_string_pretty(&status).unwrap());

    let parameters = get_json(&client, &format!("{base}/parameters")).await?;
    println!("parameters: {}", serde_json::to_string_pretty(&parameters).unwrap());

    let statistics = get_json(&client, &format!("{base}/statistics")).await?;
    println!("statistics: {}", serde_json::to_string_pretty(&statistics).unwrap());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_rewrites_wildcard_host_for_the_client() {
        let mut config = Config::default();
        config.instance_name = "recorder".to_string();
        config.rest_host = "0.0.0.0".to_string();
        config.rest_port = 9000;
        assert_eq!(base_url(&config), "http://127.0.0.1:9000/api/v1/recorder");
    }

    #[test]
    fn base_url_keeps_explicit_host() {
        let mut config = Config::default();
        config.instance_name = "recorder".to_string();
        config.rest_host = "10.0.0.5".to_string();
        config.rest_port = 9000;
        assert_eq!(base_url(&config), "http://10.0.0.5:9000/api/v1/recorder");
    }
}
