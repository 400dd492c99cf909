use fb_extract::{
    extractor::{self, Extractor, ResultRecord},
    session::Credentials,
    util,
};
use log::error;

fn print_record(record: &ResultRecord) {
    match serde_json::to_string_pretty(record) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Could not serialize {}: {}", record.id, e),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Read url from args
    let url = std::env::args().nth(1).expect("No url provided");

    // Create HttpClient
    let client = util::HttpClient::new().expect("Could not create HttpClient");

    // Credentials come from FACEBOOK_EMAIL / FACEBOOK_PASSWORD
    let extractor = Extractor::new(client, Credentials::from_env().as_ref()).await;

    if extractor::match_post_id(&url).is_some() {
        let results = match extractor.extract_post_videos(&url).await {
            Ok(results) => results,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        };

        let mut failed = false;
        for (video_id, result) in results {
            match result {
                Ok(record) => print_record(&record),
                Err(e) => {
                    error!("{}: {}", video_id, e);
                    failed = true;
                }
            }
        }
        if failed {
            std::process::exit(1);
        }
    } else {
        match extractor.extract_video(&url).await {
            Ok(record) => print_record(&record),
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
}
