use instance::config::Config;
use instance::identity::Identity;
use instance::net::ChannelSpace;
use instance::notifier::notify_update;

pub(crate) async fn run_notify(cfg: Config) -> anyhow::Result<()> {
    let identity = Identity::new(cfg.base_name.clone());
    let space = ChannelSpace::from_config(&cfg);
    if notify_update(&identity, &space).await {
        println!("update notification sent");
    }
    // No default running is not an error: the next check will try again.
    Ok(())
}
