//! Static medical schedule: antenatal visits, infant vaccinations and
//! weekly pregnancy milestones, each with localized message templates.
//!
//! Timings follow WHO and Rwanda MOH antenatal and EPI guidance. Editing
//! this table is a data change; matching logic lives in `matcher`.

use crate::models::{Language, PregnancyStatus, Priority, ReminderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Track {
    /// Keyed by gestational week.
    Antenatal,
    /// Keyed by weeks since delivery.
    Vaccination,
    /// Keyed by gestational week, swept weekly.
    Milestone,
}

impl Track {
    pub fn rules(&self) -> &'static [ReminderRule] {
        match self {
            Self::Antenatal => ANTENATAL,
            Self::Vaccination => VACCINATION,
            Self::Milestone => MILESTONES,
        }
    }

    /// Antenatal visits are windows; vaccinations and milestones are point events.
    pub fn matches_range(&self) -> bool {
        match self {
            Self::Antenatal => true,
            Self::Vaccination | Self::Milestone => false,
        }
    }

    /// The population a track applies to.
    pub fn subject_status(&self) -> PregnancyStatus {
        match self {
            Self::Antenatal | Self::Milestone => PregnancyStatus::Pregnant,
            Self::Vaccination => PregnancyStatus::Delivered,
        }
    }

    /// Tracks that apply to a subject in `status`.
    pub fn for_status(status: PregnancyStatus) -> &'static [Track] {
        match status {
            PregnancyStatus::Pregnant => &[Track::Antenatal, Track::Milestone],
            PregnancyStatus::Delivered => &[Track::Vaccination],
            PregnancyStatus::Aborted
            | PregnancyStatus::Stillbirth
            | PregnancyStatus::Infertile
            | PregnancyStatus::Preconception
            | PregnancyStatus::Menopausal
            | PregnancyStatus::Nulligravid => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub title: &'static str,
    pub body: &'static str,
    pub action_required: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Localized {
    pub en: Template,
    pub fr: Template,
    pub rw: Template,
}

impl Localized {
    pub fn get(&self, language: Language) -> &Template {
        match language {
            Language::En => &self.en,
            Language::Fr => &self.fr,
            Language::Rw => &self.rw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderRule {
    pub code: &'static str,
    pub track: Track,
    pub week_start: u32,
    pub week_end: u32,
    pub reminder_type: ReminderType,
    pub priority: Priority,
    pub templates: Localized,
}

impl ReminderRule {
    pub fn covers(&self, week: u32) -> bool {
        if self.track.matches_range() {
            self.week_start <= week && week <= self.week_end
        } else {
            week == self.week_start
        }
    }

    /// Title, personalized body and required action, one per line.
    pub fn render(&self, language: Language, name: &str, week: u32) -> String {
        let template = self.templates.get(language);
        format!(
            "{}\n{}\n{}",
            fill_placeholders(template.title, name, week),
            fill_placeholders(template.body, name, week),
            template.action_required
        )
    }
}

pub fn fill_placeholders(text: &str, name: &str, week: u32) -> String {
    text.replace("{name}", name)
        .replace("{week}", &week.to_string())
}

pub fn find_rule(code: &str) -> Option<&'static ReminderRule> {
    [Track::Antenatal, Track::Vaccination, Track::Milestone]
        .iter()
        .flat_map(|track| track.rules().iter())
        .find(|rule| rule.code == code)
}

const fn tpl(title: &'static str, body: &'static str, action_required: &'static str) -> Template {
    Template {
        title,
        body,
        action_required,
    }
}

pub static ANTENATAL: &[ReminderRule] = &[
    ReminderRule {
        code: "anc-1",
        track: Track::Antenatal,
        week_start: 6,
        week_end: 8,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "ANC 1 Visit Due",
                "Hello {name}! You're in week {week} of pregnancy. It's time for your first ANC visit to confirm pregnancy and start essential care.",
                "Visit the health center for pregnancy confirmation, HIV test, blood pressure check and folic acid supplements",
            ),
            fr: tpl(
                "Visite CPN 1",
                "Bonjour {name}! Vous êtes à la semaine {week} de grossesse. Il est temps pour votre première visite prénatale.",
                "Allez au centre de santé pour la confirmation de grossesse, le test VIH, la tension artérielle et l'acide folique",
            ),
            rw: tpl(
                "ANC 1 Yageze",
                "Mwaramutse {name}! Muri mu cyumweru {week} cy'inda. Ni igihe cyo kujya kwa muganga bwa mbere (ANC 1).",
                "Jya ku kigo nderabuzima kwemeza ko utwite, gupimwa HIV, umuvuduko w'amaraso no gufata folic acid",
            ),
        },
    },
    ReminderRule {
        code: "anc-2",
        track: Track::Antenatal,
        week_start: 13,
        week_end: 16,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "ANC 2 Visit Due",
                "Hello {name}! Week {week} - time for ANC 2. Let's check baby's growth and get your tetanus vaccination.",
                "Second ANC visit for growth monitoring, tetanus shot (TT1) and blood pressure check",
            ),
            fr: tpl(
                "Visite CPN 2",
                "Bonjour {name}! Semaine {week} - temps pour la CPN 2. Vérifions la croissance du bébé et votre vaccin antitétanique.",
                "Deuxième visite pour la croissance du bébé, le vaccin tétanos (TT1) et la tension artérielle",
            ),
            rw: tpl(
                "ANC 2 Yageze",
                "Mwaramutse {name}! Icyumweru {week} - ni igihe cya ANC 2. Dufate urukingo rwa tetanus tunasuzume uko umwana akura.",
                "ANC ya 2: imikurire y'umwana, urukingo rwa tetanus (TT1), umuvuduko w'amaraso",
            ),
        },
    },
    ReminderRule {
        code: "anc-3",
        track: Track::Antenatal,
        week_start: 20,
        week_end: 24,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "ANC 3 Visit Due",
                "Hello {name}! Week {week} - ANC 3 time! An important check for pre-eclampsia signs and continued monitoring.",
                "Third ANC visit for pre-eclampsia screening, supplements and health monitoring",
            ),
            fr: tpl(
                "Visite CPN 3",
                "Bonjour {name}! Semaine {week} - temps pour la CPN 3! Vérification importante des signes de pré-éclampsie.",
                "Troisième visite pour le dépistage de la pré-éclampsie, les suppléments et le suivi",
            ),
            rw: tpl(
                "ANC 3 Yageze",
                "Mwaramutse {name}! Icyumweru {week} - ni igihe cya ANC 3! Tuzareba ibimenyetso bya eclampsia.",
                "ANC ya 3: kureba ibimenyetso bya eclampsia no gukomeza imiti y'inyongera",
            ),
        },
    },
    ReminderRule {
        code: "anc-4",
        track: Track::Antenatal,
        week_start: 28,
        week_end: 32,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "ANC 4 Visit Due",
                "Hello {name}! Week {week} - ANC 4 appointment. Let's check baby's position and discuss delivery plans.",
                "Fourth ANC visit to check baby's position and plan the birth",
            ),
            fr: tpl(
                "Visite CPN 4",
                "Bonjour {name}! Semaine {week} - rendez-vous CPN 4. Vérifions la position du bébé et parlons de l'accouchement.",
                "Quatrième visite pour la position du bébé et le plan de naissance",
            ),
            rw: tpl(
                "ANC 4 Yageze",
                "Mwaramutse {name}! Icyumweru {week} - ni igihe cya ANC 4. Turebe uko umwana ameze tunategure uko uzabyara.",
                "ANC ya 4: kureba uko umwana ameze no gutegura kubyara",
            ),
        },
    },
    ReminderRule {
        code: "anc-5",
        track: Track::Antenatal,
        week_start: 33,
        week_end: 36,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "ANC 5 Visit Due",
                "Hello {name}! Week {week} - almost there! ANC 5 to prepare for delivery and watch for warning signs.",
                "Fifth ANC visit for delivery preparation and danger sign education",
            ),
            fr: tpl(
                "Visite CPN 5",
                "Bonjour {name}! Semaine {week} - presque là! CPN 5 pour préparer l'accouchement et surveiller les signes d'alerte.",
                "Cinquième visite pour préparer l'accouchement et connaître les signes d'alerte",
            ),
            rw: tpl(
                "ANC 5 Yageze",
                "Mwaramutse {name}! Icyumweru {week} - hafi kugerayo! ANC 5 yo kwitegura kubyara.",
                "ANC ya 5: kwitegura kubyara no kumenya ibimenyetso mpuruza",
            ),
        },
    },
    ReminderRule {
        code: "anc-weekly",
        track: Track::Antenatal,
        week_start: 37,
        week_end: 40,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "Weekly ANC Visits Now",
                "Hello {name}! Week {week} - you're full term! Visit the clinic every week until delivery and stay close to the hospital.",
                "Weekly ANC visits until delivery, watch for labor signs, stay near the hospital",
            ),
            fr: tpl(
                "Visites CPN hebdomadaires",
                "Bonjour {name}! Semaine {week} - vous êtes à terme! Une visite chaque semaine jusqu'à l'accouchement.",
                "Visites hebdomadaires, surveiller les signes du travail, rester près de l'hôpital",
            ),
            rw: tpl(
                "ANC Buri Cyumweru",
                "Mwaramutse {name}! Icyumweru {week} - igihe kirageze! Jya kwa muganga buri cyumweru kugeza ubyaye.",
                "ANC buri cyumweru, kwitondera ibimenyetso byo kubyara, kuba hafi y'ibitaro",
            ),
        },
    },
    ReminderRule {
        code: "anc-post-term",
        track: Track::Antenatal,
        week_start: 41,
        week_end: 44,
        reminder_type: ReminderType::Anc,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "Past Your Due Date",
                "Hello {name}! You're in week {week}, past your due date. Please go to the hospital so the midwife can check on you and baby.",
                "Hospital assessment for post-term pregnancy and fetal monitoring",
            ),
            fr: tpl(
                "Terme dépassé",
                "Bonjour {name}! Vous êtes à la semaine {week}, après la date prévue. Allez à l'hôpital pour un contrôle de vous et du bébé.",
                "Évaluation à l'hôpital pour grossesse prolongée et surveillance du bébé",
            ),
            rw: tpl(
                "Igihe cyo Kubyara Cyarenze",
                "Mwaramutse {name}! Muri mu cyumweru {week}, igihe cyo kubyara cyarenze. Jya ku bitaro basuzume wowe n'umwana.",
                "Gusuzumwa ku bitaro kubera inda yarengeje igihe",
            ),
        },
    },
];

pub static VACCINATION: &[ReminderRule] = &[
    ReminderRule {
        code: "vaccine-birth",
        track: Track::Vaccination,
        week_start: 0,
        week_end: 0,
        reminder_type: ReminderType::Vaccination,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "Birth Vaccinations Due",
                "Congratulations {name}! Your baby needs vaccinations now: BCG and Hepatitis B.",
                "Get BCG (tuberculosis) and Hepatitis B vaccines right after birth",
            ),
            fr: tpl(
                "Vaccins de naissance",
                "Félicitations {name}! Votre bébé a besoin de ses vaccins maintenant: BCG et Hépatite B.",
                "Faire les vaccins BCG (tuberculose) et Hépatite B dès la naissance",
            ),
            rw: tpl(
                "Inkingo zo Kuvuka",
                "Turabashimiye {name}! Umwana agomba gukingirwa BCG na Hepatitis B.",
                "Umwana akingirwe BCG na Hepatitis B akimara kuvuka",
            ),
        },
    },
    ReminderRule {
        code: "vaccine-6w",
        track: Track::Vaccination,
        week_start: 6,
        week_end: 6,
        reminder_type: ReminderType::Vaccination,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "6 Week Vaccinations Due",
                "Hello {name}! Your baby is {week} weeks old. Time for DTP, Polio and more.",
                "Pentavalent (DTP-HepB-Hib), PCV 13, OPV and Rotavirus",
            ),
            fr: tpl(
                "Vaccins de 6 semaines",
                "Bonjour {name}! Votre bébé a {week} semaines. C'est l'heure du DTC, de la polio et plus.",
                "Pentavalent (DTC-HepB-Hib), PCV 13, VPO et Rotavirus",
            ),
            rw: tpl(
                "Inkingo z'Ibyumweru 6",
                "Mwaramutse {name}! Umwana afite ibyumweru {week}. Ni igihe cy'inkingo za DTP, Polio n'izindi.",
                "Pentavalent (DTP-HepB-Hib), PCV 13, OPV na Rotavirus",
            ),
        },
    },
    ReminderRule {
        code: "vaccine-10w",
        track: Track::Vaccination,
        week_start: 10,
        week_end: 10,
        reminder_type: ReminderType::Vaccination,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "10 Week Vaccinations Due",
                "Hello {name}! Your baby is {week} weeks old. The second round of vaccinations is due.",
                "Second doses: Pentavalent 2, PCV 13 2, OPV 2, Rotavirus 2",
            ),
            fr: tpl(
                "Vaccins de 10 semaines",
                "Bonjour {name}! Votre bébé a {week} semaines. La deuxième série de vaccins est due.",
                "Deuxièmes doses: Pentavalent 2, PCV 13 2, VPO 2, Rotavirus 2",
            ),
            rw: tpl(
                "Inkingo z'Ibyumweru 10",
                "Mwaramutse {name}! Umwana afite ibyumweru {week}. Inkingo zikurikiyeho zirageze.",
                "Doze ya 2: Pentavalent 2, PCV 13 2, OPV 2, Rotavirus 2",
            ),
        },
    },
    ReminderRule {
        code: "vaccine-14w",
        track: Track::Vaccination,
        week_start: 14,
        week_end: 14,
        reminder_type: ReminderType::Vaccination,
        priority: Priority::High,
        templates: Localized {
            en: tpl(
                "14 Week Vaccinations Due",
                "Hello {name}! Your baby is {week} weeks old. The third and final primary series is due.",
                "Third doses: Pentavalent 3, PCV 13 3, OPV 3",
            ),
            fr: tpl(
                "Vaccins de 14 semaines",
                "Bonjour {name}! Votre bébé a {week} semaines. La troisième et dernière série primaire est due.",
                "Troisièmes doses: Pentavalent 3, PCV 13 3, VPO 3",
            ),
            rw: tpl(
                "Inkingo z'Ibyumweru 14",
                "Mwaramutse {name}! Umwana afite ibyumweru {week}. Doze ya 3 y'inkingo irageze.",
                "Doze ya 3: Pentavalent 3, PCV 13 3, OPV 3",
            ),
        },
    },
];

/// Milestone headline rules. The educational paragraph that follows the
/// headline is generated per subject, see `content`.
macro_rules! milestone {
    ($code:literal, $week:literal, $en:literal, $fr:literal, $rw:literal) => {
        ReminderRule {
            code: $code,
            track: Track::Milestone,
            week_start: $week,
            week_end: $week,
            reminder_type: ReminderType::Milestone,
            priority: Priority::Medium,
            templates: Localized {
                en: tpl(
                    "Week {week} Milestone",
                    concat!("Week {week} milestone, {name}! ", $en),
                    "Check the app for this week's details",
                ),
                fr: tpl(
                    "Étape de la semaine {week}",
                    concat!("Étape de la semaine {week}, {name}! ", $fr),
                    "Consultez l'application pour les détails de la semaine",
                ),
                rw: tpl(
                    "Intambwe y'Icyumweru {week}",
                    concat!("Intambwe y'icyumweru {week}, {name}! ", $rw),
                    "Reba muri aplikasiyo ibisobanuro by'iki cyumweru",
                ),
            },
        }
    };
}

pub static MILESTONES: &[ReminderRule] = &[
    milestone!(
        "milestone-4", 4,
        "Your baby's heart is starting to develop.",
        "Le cœur de votre bébé commence à se former.",
        "Umutima w'umwana utangiye kwirema."
    ),
    milestone!(
        "milestone-8", 8,
        "Your baby's brain is developing quickly.",
        "Le cerveau de votre bébé se développe rapidement.",
        "Ubwonko bw'umwana burakura vuba."
    ),
    milestone!(
        "milestone-12", 12,
        "You have completed the first trimester.",
        "Vous avez terminé le premier trimestre.",
        "Urangije igihembwe cya mbere cy'inda."
    ),
    milestone!(
        "milestone-16", 16,
        "You may soon feel your baby's first movements.",
        "Vous sentirez bientôt les premiers mouvements de votre bébé.",
        "Ushobora gutangira kumva umwana anyeganyega."
    ),
    milestone!(
        "milestone-20", 20,
        "Halfway there: this is anatomy scan time.",
        "À mi-chemin: c'est le moment de l'échographie morphologique.",
        "Ugeze hagati: ni igihe cyo gucishwa mu cyuma."
    ),
    milestone!(
        "milestone-24", 24,
        "Your baby has reached the viability milestone.",
        "Votre bébé a atteint le seuil de viabilité.",
        "Umwana ageze ku rwego rwo kuba yabaho avutse."
    ),
    milestone!(
        "milestone-28", 28,
        "Welcome to the third trimester.",
        "Bienvenue au troisième trimestre.",
        "Murakaza neza mu gihembwe cya gatatu."
    ),
    milestone!(
        "milestone-32", 32,
        "Your baby is in a rapid growth phase.",
        "Votre bébé est en pleine croissance rapide.",
        "Umwana ari mu gihe cyo gukura vuba."
    ),
    milestone!(
        "milestone-36", 36,
        "Your baby's lungs are maturing.",
        "Les poumons de votre bébé arrivent à maturité.",
        "Ibihaha by'umwana birimo kuzura."
    ),
    milestone!(
        "milestone-40", 40,
        "Your baby is full term and ready.",
        "Votre bébé est à terme et prêt.",
        "Umwana ageze igihe cyo kuvuka."
    ),
];
