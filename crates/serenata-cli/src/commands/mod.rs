pub mod answers;
pub mod checkout;
pub mod compare;
pub mod config;
pub mod generate;
pub mod session;

pub use checkout::run_checkout;
pub use compare::run_compare;
pub use generate::run_generate;

use serenata_core::model::SongRef;

/// Print the songs on the comparison page.
pub fn print_songs(songs: &[SongRef]) {
    println!("\n🎵 {} song(s) ready\n", songs.len());
    for song in songs {
        println!("  [{}] {}", song.version, song.id);
        if let Some(url) = song.playable_url() {
            println!("      listen: {url}");
        }
        if let Some(image) = &song.image_url {
            println!("      cover:  {image}");
        }
    }
}
