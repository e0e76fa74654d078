#[macro_use] extern crate rocket;

use snapshelf::config::Config;
use snapshelf::regions;


#[launch]
fn rocket() -> _ {
    // Try to read the config file
    let config = Config::read_or_exit();

    // The region table is checked (and created if needed) by a fairing at ignition
    regions::build(config)
}
