use halo::{event_channel, packet_channel, Config, Identity, SessionManager};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("HALO Session Manager");
    println!("====================\n");

    println!("1. Loading configuration...");
    let (config, loaded_path) = match Config::load() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("   error loading config: {}", e);
            std::process::exit(1);
        }
    };
    match &loaded_path {
        Some(path) => println!("   loaded {}", path.display()),
        None => println!("   no halo.yaml found, using defaults"),
    }
    println!("   max buffered messages: {}", config.session.max_buffered_messages);

    println!("\n2. Generating identity...");
    let identity = Identity::generate();
    println!("   public key: {}", hex::encode(identity.public_key_bytes()));
    println!("   address:    {}", identity.address());

    println!("\n3. Assembling session manager...");
    let (inside_tx, _inside_rx) = packet_channel();
    let (switch_tx, _switch_rx) = packet_channel();
    let (event_tx, _event_rx) = event_channel();
    let manager = SessionManager::new(identity, &config.session, inside_tx, switch_tx, event_tx);
    println!("   first handle: {}", manager.first_handle());

    println!("\nReady. Wire the inside, switch and event interfaces and");
    println!("drive `SessionManager::run` to bring the node up.");
}
