#[macro_use] extern crate rocket;

use snapshelf::config::Config;
use snapshelf::gallery;


#[launch]
async fn rocket() -> _ {
    // Try to read the config file
    let config = Config::read_or_exit();

    // Prepare the upload directory and the metadata file, or exit immediately in case of an error
    gallery::build(config).await
        .unwrap_or_else(|error| {
            eprintln!("Error : unable to prepare the photo storage : {}", error);
            std::process::exit(-1)
        })
}
