//! Segment manager walkthrough: create, write, re-open, read, destroy.

use edge_ipc_shared_memory::Segment;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let segment = Segment::create_random(1024)?;
    println!(
        "created segment key={} id={} capacity={}",
        segment.key(),
        segment.id(),
        segment.capacity()?
    );

    segment.write(b"bulk tensor bytes would go here")?;

    // A consumer process would receive the raw key out of band (socket
    // message or pipe signal) and re-open the segment with it.
    let consumer = Segment::open(segment.key())?;
    let attachment = consumer.read()?;
    println!(
        "read back {} bytes: {:?}",
        attachment.payload()?.len(),
        String::from_utf8_lossy(attachment.payload()?)
    );
    drop(attachment);

    segment.destroy()?;
    println!("segment destroyed");
    Ok(())
}
