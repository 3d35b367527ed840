diesel::table! {
    contacts (id) {
        id -> Uuid,
        owner_id -> Uuid,
        first_name -> Nullable<Text>,
        last_name -> Nullable<Text>,
        email -> Nullable<Text>,
        phone -> Nullable<Text>,
        company_id -> Nullable<Uuid>,
        source -> Nullable<Text>,
        source_detail -> Nullable<Text>,
        gdpr_consent -> Bool,
        gdpr_consent_date -> Nullable<Timestamptz>,
        deleted_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    companies (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Text,
        city -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    deals (id) {
        id -> Uuid,
        owner_id -> Uuid,
        contact_id -> Nullable<Uuid>,
        company_id -> Nullable<Uuid>,
        title -> Text,
        stage -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    activities (id) {
        id -> Uuid,
        owner_id -> Uuid,
        contact_id -> Nullable<Uuid>,
        deal_id -> Nullable<Uuid>,
        activity_type -> Text,
        description -> Text,
        metadata -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    form_submissions (id) {
        id -> Uuid,
        source_site -> Text,
        source_page -> Nullable<Text>,
        payload -> Jsonb,
        ip_hash -> Nullable<Text>,
        is_duplicate -> Bool,
        contact_id -> Nullable<Uuid>,
        deal_id -> Nullable<Uuid>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    campaigns (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Text,
        subject -> Text,
        body_html -> Text,
        status -> Text,
        total_sent -> Int4,
        total_opened -> Int4,
        total_clicked -> Int4,
        sent_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    campaign_recipients (id) {
        id -> Uuid,
        campaign_id -> Uuid,
        contact_id -> Nullable<Uuid>,
        email -> Text,
        status -> Text,
        brevo_message_id -> Nullable<Text>,
        sent_at -> Nullable<Timestamptz>,
        opened_at -> Nullable<Timestamptz>,
        clicked_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(contacts -> companies (company_id));
diesel::joinable!(deals -> contacts (contact_id));
diesel::joinable!(deals -> companies (company_id));
diesel::joinable!(activities -> contacts (contact_id));
diesel::joinable!(activities -> deals (deal_id));
diesel::joinable!(campaign_recipients -> campaigns (campaign_id));
diesel::joinable!(campaign_recipients -> contacts (contact_id));

diesel::allow_tables_to_appear_in_same_query!(
    contacts,
    companies,
    deals,
    activities,
    form_submissions,
    campaigns,
    campaign_recipients,
);
