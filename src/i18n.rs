/// Terminal copy for the CLI, selected with `--locale` (e.g. `--locale pt`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Pt,
}

impl Locale {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pt" | "pt-br" | "pt_br" | "pt-pt" | "pt_pt" => Self::Pt,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub submitting: &'static str,
    pub job_started: &'static str,
    pub processing: &'static str,
    pub retrying: &'static str,
    pub completed: &'static str,
    pub failed: &'static str,
    pub timed_out: &'static str,
    pub cancelled: &'static str,
    pub file_ready: &'static str,
    pub saved_to: &'static str,
    pub options_ignored: &'static str,
    pub platform_unknown: &'static str,
    pub url_valid: &'static str,
    pub url_invalid: &'static str,
    pub title: &'static str,
    pub uploader: &'static str,
    pub duration: &'static str,
    pub views: &'static str,
    pub likes: &'static str,
    pub size: &'static str,
    pub no_vods: &'static str,
    pub pick_out_of_range: &'static str,
    pub error_prefix: &'static str,
    pub info_prefix: &'static str,
}

pub static EN: Messages = Messages {
    submitting: "Submitting",
    job_started: "Job started",
    processing: "processing",
    retrying: "server unreachable, retrying",
    completed: "Download complete",
    failed: "Download failed",
    timed_out: "Gave up waiting for the server",
    cancelled: "Cancelled",
    file_ready: "File",
    saved_to: "Saved to",
    options_ignored: "quality/format are not supported for this platform and were ignored",
    platform_unknown: "could not tell the platform from the URL; pass --platform",
    url_valid: "valid",
    url_invalid: "invalid",
    title: "Title",
    uploader: "Uploader",
    duration: "Duration",
    views: "Views",
    likes: "Likes",
    size: "Size",
    no_vods: "No VODs found",
    pick_out_of_range: "no VOD with that index",
    error_prefix: "ERR",
    info_prefix: "INFO",
};

pub static PT: Messages = Messages {
    submitting: "Enviando",
    job_started: "Download iniciado",
    processing: "processando",
    retrying: "servidor inacessível, tentando novamente",
    completed: "Download concluído",
    failed: "Erro no download",
    timed_out: "Tempo esgotado aguardando o servidor",
    cancelled: "Cancelado",
    file_ready: "Arquivo",
    saved_to: "Salvo em",
    options_ignored: "qualidade/formato não são suportados nesta plataforma e foram ignorados",
    platform_unknown: "não foi possível identificar a plataforma pela URL; use --platform",
    url_valid: "válida",
    url_invalid: "inválida",
    title: "Título",
    uploader: "Autor",
    duration: "Duração",
    views: "Visualizações",
    likes: "Curtidas",
    size: "Tamanho",
    no_vods: "Nenhum VOD encontrado",
    pick_out_of_range: "nenhum VOD com esse índice",
    error_prefix: "ERRO",
    info_prefix: "INFO",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Pt => &PT,
    }
}
