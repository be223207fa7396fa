use tera::{Context, Tera};

use super::models::{LeaseNoticeContext, RenderedMessage};

const SUBJECT_TEMPLATE: &str = "subject";
const BODY_TEMPLATE: &str = "body";

const SUBJECT: &str = r#"{% if expiry_class == "EXPIRED" -%}
[Expired] {{ lease_name }} expired on {{ expires_at }}
{%- elif recipient_class == "ADMIN" -%}
[Escalation] {{ lease_name }} ({{ project_name }}) expires in {{ days_until_expiry }} day{{ days_until_expiry | pluralize }}
{%- elif expiry_class == "ADMIN_DUE" -%}
[Action required] {{ lease_name }} expires in {{ days_until_expiry }} day{{ days_until_expiry | pluralize }}
{%- else -%}
[Lease reminder] {{ lease_name }} expires in {{ days_until_expiry }} day{{ days_until_expiry | pluralize }}
{%- endif %}"#;

const BODY: &str = r#"{% if recipient_class == "ADMIN" %}Administrator notice for project {{ project_name }}.{% else %}Hello,{% endif %}

{% if expiry_class == "EXPIRED" -%}
The VM lease "{{ lease_name }}" expired on {{ expires_at }}{% if days_overdue > 0 %} ({{ days_overdue }} day{{ days_overdue | pluralize }} ago){% endif %} and has not been renewed.
{%- else -%}
The VM lease "{{ lease_name }}" expires on {{ expires_at }} ({{ days_until_expiry }} day{{ days_until_expiry | pluralize }} from now).
{%- endif %}

Project:    {{ project_name }}
Hostname:   {{ hostname }}
IP address: {{ ip_address }}
Account:    {{ account_id }}
{% if suggested_renewal_date %}
Suggested renewal date: {{ suggested_renewal_date }}
{% endif %}
Manage this lease: {{ app_url }}/leases/{{ lease_id }}
"#;

#[derive(Debug, thiserror::Error)]
#[error("Templating error: {0}")]
pub struct TemplateError(#[from] tera::Error);

/// Renders lease notices. Templates are compiled once at construction.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    tera: Tera,
}

impl MessageRenderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![(SUBJECT_TEMPLATE, SUBJECT), (BODY_TEMPLATE, BODY)])?;
        Ok(Self { tera })
    }

    pub fn render(&self, notice: &LeaseNoticeContext) -> Result<RenderedMessage, TemplateError> {
        let context = Context::from_serialize(notice)?;
        let subject = self.tera.render(SUBJECT_TEMPLATE, &context)?;
        let text_body = self.tera.render(BODY_TEMPLATE, &context)?;
        Ok(RenderedMessage {
            subject: subject.trim().to_string(),
            text_body,
        })
    }
}
