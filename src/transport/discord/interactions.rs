//! Interaction routing: command -> modal -> rewrite -> preview -> send/cancel.

use std::future::Future;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};

use super::commands::is_command;
use super::components::{
    ButtonAction, COMPOSE_MODAL_ID, compose_modal, custom_id, discarded_message, ephemeral_flags,
    error_followup, error_message, extract_draft_text, preview_message, sent_message,
};
use super::gateway::Interaction;
use super::http_client::DiscordHttpClient;
use super::proxy::{ProxyIdentity, SendProxy, SendRoute};
use super::types::{InteractionCallbackType, InteractionType};
use crate::config::DiscordConfig;
use crate::drafts::{Draft, DraftStore};
use crate::error::TransportError;
use crate::providers::Rewriter;

const SEND_FAILED_MESSAGE: &str =
    "the message could not be posted; your draft is kept, try Send again";
const PARTIAL_SEND_MESSAGE: &str =
    "only part of the message could be posted; the draft was discarded so nothing is posted twice";

/// Await a reporting call whose failure must not mask the original outcome.
async fn report_best_effort<F>(what: &'static str, report: F)
where
    F: Future<Output = Result<()>>,
{
    if let Err(e) = report.await {
        tracing::debug!(what, error = %e, "interaction.report_failed");
    }
}

pub struct InteractionHandler {
    http: Arc<DiscordHttpClient>,
    rewriter: Arc<dyn Rewriter>,
    drafts: Arc<DraftStore>,
    proxy: SendProxy,
    command_name: String,
    guild_id: Option<String>,
    application_id: RwLock<Option<String>>,
}

impl InteractionHandler {
    pub fn new(
        http: Arc<DiscordHttpClient>,
        rewriter: Arc<dyn Rewriter>,
        drafts: Arc<DraftStore>,
        config: &DiscordConfig,
    ) -> Self {
        Self {
            proxy: SendProxy::new(Arc::clone(&http), config.proxy_name.clone()),
            http,
            rewriter,
            drafts,
            command_name: config.command_name.clone(),
            guild_id: config.guild_id.clone(),
            application_id: RwLock::new(config.application_id.clone()),
        }
    }

    /// Record the application id learned from READY unless one is configured.
    pub fn learn_application_id(&self, application_id: &str) {
        let mut guard = self
            .application_id
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(application_id.to_string());
        }
    }

    pub fn application_id(&self) -> Option<String> {
        self.application_id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn application_id_for(&self, interaction: &Interaction) -> Option<String> {
        interaction
            .application_id
            .clone()
            .or_else(|| self.application_id())
    }

    fn matches_guild_filter(&self, guild_id: Option<&str>) -> bool {
        match &self.guild_id {
            Some(gid) => guild_id.is_some_and(|g| g == gid),
            None => true,
        }
    }

    /// Handle one interaction to completion. Failures are logged, not returned.
    pub async fn handle(&self, interaction: Interaction) {
        if !self.matches_guild_filter(interaction.guild_id.as_deref()) {
            tracing::debug!(
                guild_id = interaction.guild_id.as_deref().unwrap_or("none"),
                "interaction.ignored_guild"
            );
            return;
        }

        let result = match InteractionType::from_u64(interaction.kind) {
            Some(InteractionType::ApplicationCommand)
                if is_command(&interaction.data, &self.command_name) =>
            {
                self.open_compose_modal(&interaction).await
            }
            Some(InteractionType::ModalSubmit)
                if custom_id(&interaction.data) == Some(COMPOSE_MODAL_ID) =>
            {
                self.handle_compose_submit(&interaction).await
            }
            Some(InteractionType::MessageComponent) => {
                match custom_id(&interaction.data).and_then(ButtonAction::from_custom_id) {
                    Some(ButtonAction::Send) => self.handle_send(&interaction).await,
                    Some(ButtonAction::Cancel) => self.handle_cancel(&interaction).await,
                    None => Ok(()),
                }
            }
            _ => {
                tracing::debug!(kind = interaction.kind, "interaction.unhandled");
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(
                interaction_id = %interaction.id,
                user_id = %interaction.user.id,
                error = %e,
                "interaction.failed"
            );
        }
    }

    async fn respond(
        &self,
        interaction: &Interaction,
        kind: InteractionCallbackType,
        data: Option<serde_json::Value>,
    ) -> Result<()> {
        self.http
            .create_interaction_response(&interaction.id, &interaction.token, kind as u8, data)
            .await
    }

    async fn edit_original(&self, interaction: &Interaction, body: serde_json::Value) -> Result<()> {
        let application_id = self
            .application_id_for(interaction)
            .context("application id unknown; cannot edit interaction response")?;
        self.http
            .edit_original_interaction_response(&application_id, &interaction.token, body)
            .await
    }

    async fn followup_error(&self, interaction: &Interaction, message: &str) -> Result<()> {
        let application_id = self
            .application_id_for(interaction)
            .context("application id unknown; cannot send follow-up")?;
        self.http
            .create_followup_message(&application_id, &interaction.token, error_followup(message))
            .await
    }

    async fn open_compose_modal(&self, interaction: &Interaction) -> Result<()> {
        self.respond(interaction, InteractionCallbackType::Modal, Some(compose_modal()))
            .await
            .context("open compose modal")
    }

    async fn handle_compose_submit(&self, interaction: &Interaction) -> Result<()> {
        self.respond(
            interaction,
            InteractionCallbackType::DeferredChannelMessageWithSource,
            Some(ephemeral_flags()),
        )
        .await
        .context("defer compose submit")?;

        let original_text = extract_draft_text(&interaction.data).unwrap_or_default();
        match self.rewriter.rewrite(&original_text).await {
            Ok(result) => {
                let preview = preview_message(result.text());
                let replaced = self.drafts.put(Draft::new(
                    interaction.user.id.clone(),
                    result.into_text(),
                    interaction.channel_id.clone(),
                ));
                tracing::info!(
                    user_id = %interaction.user.id,
                    channel_id = %interaction.channel_id,
                    replaced = replaced.is_some(),
                    "interaction.draft_ready"
                );
                self.edit_original(interaction, preview)
                    .await
                    .context("show draft preview")
            }
            Err(e) => {
                tracing::info!(
                    user_id = %interaction.user.id,
                    provider = self.rewriter.name(),
                    error = %e,
                    "interaction.rewrite_failed"
                );
                report_best_effort(
                    "rewrite error",
                    self.edit_original(interaction, error_message(&e.to_string())),
                )
                .await;
                Ok(())
            }
        }
    }

    async fn handle_send(&self, interaction: &Interaction) -> Result<()> {
        self.respond(interaction, InteractionCallbackType::DeferredUpdateMessage, None)
            .await
            .context("defer send button")?;

        let draft = match self
            .drafts
            .take_for_send(&interaction.user.id, &interaction.channel_id)
        {
            Ok(draft) => draft,
            Err(e) => {
                tracing::info!(user_id = %interaction.user.id, error = %e, "interaction.send_rejected");
                report_best_effort("draft error", self.followup_error(interaction, &e.to_string()))
                    .await;
                return Ok(());
            }
        };

        let identity = ProxyIdentity::from_user(&interaction.user, interaction.guild_id.as_deref());
        let application_id = self.application_id_for(interaction);
        match self
            .proxy
            .send(
                &interaction.channel_id,
                &identity,
                &draft.rewritten_text,
                application_id.as_deref(),
            )
            .await
        {
            Ok(route) => {
                report_best_effort(
                    "sent confirmation",
                    self.edit_original(interaction, sent_message(route == SendRoute::BotFallback)),
                )
                .await;
                Ok(())
            }
            Err(e) => {
                let partial = matches!(
                    e.downcast_ref::<TransportError>(),
                    Some(TransportError::PartialDelivery { .. })
                );
                // Nothing posted: the draft goes back unless a newer one replaced it.
                let restored = !partial && self.drafts.restore(draft);
                tracing::warn!(
                    user_id = %interaction.user.id,
                    channel_id = %interaction.channel_id,
                    partial,
                    restored,
                    error = %e,
                    "interaction.send_failed"
                );
                let message = if partial {
                    PARTIAL_SEND_MESSAGE
                } else {
                    SEND_FAILED_MESSAGE
                };
                report_best_effort("send failure", self.followup_error(interaction, message)).await;
                Ok(())
            }
        }
    }

    async fn handle_cancel(&self, interaction: &Interaction) -> Result<()> {
        let discarded = self.drafts.cancel(&interaction.user.id);
        tracing::info!(
            user_id = %interaction.user.id,
            had_draft = discarded.is_some(),
            "interaction.draft_cancelled"
        );
        self.respond(
            interaction,
            InteractionCallbackType::UpdateMessage,
            Some(discarded_message()),
        )
        .await
        .context("acknowledge cancel")
    }
}
