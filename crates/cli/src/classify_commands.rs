use std::path::Path;

use {
    anyhow::{Context, Result},
    mqttgram_bridge::Pipeline,
    mqttgram_common::{Alert, InboundMessage},
};

/// Run a payload file through the pipeline and print what would be sent.
pub fn classify(config_path: Option<&Path>, topic: &str, file: &Path) -> Result<()> {
    let config = mqttgram_config::load(config_path)?;
    let payload =
        std::fs::read(file).with_context(|| format!("reading payload file {}", file.display()))?;

    let pipeline = Pipeline::new(&config.classifier);
    let Some(processed) = pipeline.process(&InboundMessage::new(topic, payload)) else {
        println!("decision: none (empty payload is dropped)");
        return Ok(());
    };

    println!("decision: {}", processed.decision);
    if let Some(err) = &processed.fallback {
        println!("fallback: {err}");
    }
    match &processed.alert {
        Alert::Text { body } => {
            println!("alert:    text");
            println!("{body}");
        },
        Alert::Image { bytes, caption } => {
            println!("alert:    image ({} bytes)", bytes.len());
            println!("caption:  {caption}");
        },
    }
    Ok(())
}
